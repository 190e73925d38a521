//! # Data Store

use log::{info, warn};

use drive_lib::{
    drive_ctrl::{DriveCtrl, InputData, OutputData, StatusReport},
    heading::HeadingSensor,
    module_ctrl::ModuleIo
};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Gives the reason the drive has been put into safe mode
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SafeModeCause {
    /// No command arrived within the command timeout.
    CmdTimeout,

    /// A sensor has faulted for longer than the configured limit.
    SensorFaultLimit
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
pub struct DataStore<M: ModuleIo, G: HeadingSensor> {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// Session elapsed time at the start of the cycle
    pub cycle_start_s: f64,

    // Safe mode variables
    /// Determines if the drive is in safe mode.
    pub safe: bool,

    /// Gives the reason for the drive being in safe mode.
    pub safe_cause: Option<SafeModeCause>,

    // DriveCtrl
    pub drive_ctrl: DriveCtrl<M, G>,
    pub drive_ctrl_input: InputData,
    pub drive_ctrl_output: OutputData,
    pub drive_ctrl_status_rpt: StatusReport,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl<M: ModuleIo, G: HeadingSensor> DataStore<M, G> {
    pub fn new(drive_ctrl: DriveCtrl<M, G>) -> Self {
        Self {
            num_cycles: 0,
            cycle_start_s: 0.0,
            safe: false,
            safe_cause: None,
            drive_ctrl,
            drive_ctrl_input: InputData::default(),
            drive_ctrl_output: OutputData::default(),
            drive_ctrl_status_rpt: StatusReport::default(),
            num_consec_cycle_overruns: 0
        }
    }

    /// Puts the drive into safe mode with the given cause.
    pub fn make_safe(&mut self, cause: SafeModeCause) {
        if !self.safe {
            warn!("Make safe requested, cause: {:?}", cause);
            self.safe = true;
            self.safe_cause = Some(cause);

            self.drive_ctrl.make_safe();
        }
    }

    /// Attempts to disable the safe mode by clearing the given cause.
    ///
    /// Returns `Ok(())` if this cause was cleared and safe mode was disabled, or `Err(())`
    /// otherwise. To remove safe mode the provided cause must match the initial reason for safe
    /// mode being enabled.
    ///
    /// If safe mode was not enabled `Ok(())` is returned
    pub fn make_unsafe(&mut self, cause: SafeModeCause) -> Result<(), ()> {
        if !self.safe {
            return Ok(());
        }

        match self.safe_cause {
            Some(root_cause) if root_cause == cause => {
                self.safe = false;
                self.safe_cause = None;
                info!("Make unsafe requested, root cause match, safe mode disabled");
                Ok(())
            },
            Some(_) => Err(()),
            None => Ok(())
        }
    }

    /// Perform actions required at the start of a cycle.
    pub fn cycle_start(&mut self, dt_s: f64) {
        self.drive_ctrl_input = InputData {
            dt_s,
            ..Default::default()
        };

        self.cycle_start_s = util::session::get_elapsed_seconds();
    }
}
