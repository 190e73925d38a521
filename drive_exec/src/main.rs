//! Main drive executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop:
//!         - Command acquisition, from a script or from the command thread
//!         - Command watchdog and safe mode management
//!         - Drive control processing (sensing, module loops, odometry)
//!         - Simulated hardware step
//!
//! Commands are JSON `DriveCmd`s. With a script argument they are read from
//! a drive script (`<time_s>: <cmd>;` lines), otherwise one command per line
//! is read from stdin on a separate thread and handed to the main loop
//! through a command slot.
//!
//! # Modules
//!
//! All modules (e.g. `drive_ctrl`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.
//!

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use drive_lib::{
    cmd_slot::{cmd_slot, CmdReader, CmdWriter},
    drive_ctrl::{DriveCmd, Params},
    sim::{self, SimChassis},
    tm::ArchiveSink
};

mod data_store;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, warn};
use std::env;
use std::io::{self, BufRead};
use std::thread;
use std::time::{Duration, Instant};
use color_eyre::{Report, eyre::{WrapErr, eyre}};

// Internal
use data_store::{DataStore, SafeModeCause};
use util::{
    host,
    module::State,
    logger::{logger_init, LevelFilter},
    session::Session,
    time::period_from_hz,
    script_interpreter::{ScriptInterpreter, PendingCmds}
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target frequency of the control cycle.
const CYCLE_FREQUENCY_HZ: f64 = 50.0;

/// Name of the telemetry archive in the session's archive directory.
const TM_ARCHIVE_NAME: &str = "drive_tm.csv";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Various sources for the commands incoming to the exec.
enum CmdSource {
    Script {
        si: ScriptInterpreter<DriveCmd>,
        start_s: f64
    },
    Stdin(CmdReader<DriveCmd>)
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "drive_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, LevelFilter::Info, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Swerve Drive Executable\n");
    info!("Running on: {}", host::get_host_info());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: Params = util::params::load("drive_ctrl.toml")
        .wrap_err("Could not load DriveCtrl params")?;

    let cmd_timeout = Duration::from_secs_f64(params.cmd_timeout_s);

    let cycle_period_s = period_from_hz(CYCLE_FREQUENCY_HZ)
        .ok_or_else(|| eyre!("Invalid cycle frequency {} Hz", CYCLE_FREQUENCY_HZ))?;

    info!("Exec parameters loaded");

    // ---- INITIALISE CMD SOURCE ----

    // Collect all arguments
    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    let mut cmd_source = if args.len() == 2 {
        info!("Loading script from \"{}\"", &args[1]);

        let si = ScriptInterpreter::new(&args[1])
            .wrap_err("Failed to load script")?;

        info!(
            "Loaded script lasts {:.02} s and contains {} commands\n",
            si.get_duration(),
            si.get_num_cmds()
        );

        CmdSource::Script {
            si,
            start_s: util::session::get_elapsed_seconds()
        }
    }
    else if args.len() == 1 {
        info!("No script provided, reading commands from stdin\n");

        let (writer, reader) = cmd_slot();
        thread::spawn(move || stdin_thread(writer));

        CmdSource::Stdin(reader)
    }
    else {
        return Err(eyre!(
            "Expected either zero or one argument, found {}", args.len() - 1)
        );
    };

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut drive_ctrl = sim::sim_drive(params, 0.0)
        .wrap_err("Failed to initialise DriveCtrl")?;
    info!("DriveCtrl init complete");

    drive_ctrl.set_tm_sink(Box::new(
        ArchiveSink::new(&session, TM_ARCHIVE_NAME)
            .wrap_err("Failed to open the telemetry archive")?
    ));

    let mut ds = DataStore::new(drive_ctrl);
    let mut chassis = SimChassis::default();

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {

        // Get cycle start time
        let cycle_start_instant = Instant::now();

        ds.cycle_start(cycle_period_s);

        // ---- COMMAND PROCESSING ----

        let mut cmds = vec![];

        match cmd_source {
            CmdSource::Script { ref mut si, start_s } => {
                match si.get_pending(ds.cycle_start_s - start_s) {
                    PendingCmds::None => (),
                    PendingCmds::Some(mut v) => cmds.append(&mut v),
                    PendingCmds::EndOfScript => {
                        info!("End of drive script reached, stopping");
                        break
                    }
                }
            },
            CmdSource::Stdin(ref mut reader) => {
                match reader.take() {
                    Ok(Some(cmd)) => {
                        ds.make_unsafe(SafeModeCause::CmdTimeout).ok();
                        cmds.push(cmd);
                    },
                    Ok(None) => {
                        if reader.is_disconnected() {
                            info!("Command source closed, stopping");
                            break
                        }
                    },
                    Err(e) => return Err(e).wrap_err("Could not read the command slot")
                }

                // Command watchdog
                match reader.age() {
                    Ok(Some(age)) if age > cmd_timeout => {
                        if !ds.safe {
                            error!(
                                "No command received for {:.02} s",
                                age.as_secs_f64()
                            );
                        }
                        ds.make_safe(SafeModeCause::CmdTimeout);
                    },
                    Ok(_) => (),
                    Err(e) => return Err(e).wrap_err("Could not read the command slot")
                }
            }
        }

        // Drive commands are not executed in safe mode, the rest are
        for cmd in cmds {
            match cmd {
                DriveCmd::Drive { .. } if ds.safe => warn!(
                    "Drive command rejected, in safe mode ({:?})",
                    ds.safe_cause
                ),
                _ => ds.drive_ctrl.exec_cmd(&cmd)
            }
        }

        // ---- CONTROL ALGORITHM PROCESSING ----

        // Commands have already been executed, so only the cycle runs here
        match ds.drive_ctrl.proc(&ds.drive_ctrl_input) {
            Ok((o, r)) => {
                ds.drive_ctrl_output = o;
                ds.drive_ctrl_status_rpt = r;
            },
            Err(e) => match e {}
        };

        if ds.drive_ctrl_status_rpt.fault_limit_exceeded {
            ds.make_safe(SafeModeCause::SensorFaultLimit);
        }
        else {
            ds.make_unsafe(SafeModeCause::SensorFaultLimit).ok();
        }

        // ---- SIMULATION ----

        sim::step_sim(&mut ds.drive_ctrl, &mut chassis, cycle_period_s);

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(cycle_period_s)
            .checked_sub(cycle_dur)
        {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            },
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period_s
                );
                ds.num_consec_cycle_overruns += 1;
            }
        }

        ds.num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    ds.drive_ctrl.stop();

    let pose = ds.drive_ctrl.pose();
    info!(
        "Final pose estimate: ({:.3}, {:.3}) m, {:.1} deg",
        pose.x_m, pose.y_m, pose.heading_rad.to_degrees()
    );
    info!(
        "Simulated pose: ({:.3}, {:.3}) m, {:.1} deg",
        chassis.pose.x_m, chassis.pose.y_m, chassis.pose.heading_rad.to_degrees()
    );

    session.save_json("final_pose.json", &pose)
        .wrap_err("Could not save the final pose")?;

    info!("End of execution after {} cycles", ds.num_cycles);

    Ok(())
}

/// Read JSON commands from stdin, one per line, into the command slot.
///
/// Returns when stdin closes or the main loop has gone.
fn stdin_thread(writer: CmdWriter<DriveCmd>) {
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("Could not read from stdin: {}", e);
                break
            }
        };

        if line.trim().is_empty() {
            continue
        }

        match serde_json::from_str::<DriveCmd>(&line) {
            Ok(cmd) => {
                if writer.write(cmd).is_err() {
                    break
                }
            },
            Err(e) => warn!("Could not parse command \"{}\": {}", line.trim(), e)
        }
    }
}
