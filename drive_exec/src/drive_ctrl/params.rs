//! Parameters structure for DriveCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::MAX_CAN_ID;
use crate::kinematics::{ModuleGeometry, ModuleId, NUM_MODULES};
use crate::module_ctrl::{DeviceIds, ModuleCal, ModuleConfig};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for drive control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {

    // ---- CAPABILITIES ----

    /// The allowed maximum ground speed of any wheel, and the speed a
    /// normalised linear request of 1.0 is scaled to.
    ///
    /// Units: meters/second
    pub max_speed_ms: f64,

    /// The rotation rate a normalised angular request of 1.0 is scaled to.
    ///
    /// Units: radians/second
    pub max_angular_speed_rads: f64,

    // ---- HEADING ----

    /// Negate the heading sensor's turn rate.
    pub gyro_reversed: bool,

    // ---- FAULTS ----

    /// Number of consecutive faulted samples a sensor may give before the
    /// fault limit is reported as exceeded.
    pub sensor_fault_limit: u32,

    /// Time without a new command after which the executable stops the
    /// drive.
    ///
    /// Units: seconds
    pub cmd_timeout_s: f64,

    // ---- MODULES ----

    /// Calibration shared by all modules.
    pub module_cal: ModuleCal,

    /// Per-module configuration, in `ModuleId` order.
    pub modules: [ModuleParams; NUM_MODULES]
}

/// Parameters of a single module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleParams {
    pub id: ModuleId,

    /// Position of the module in the chassis frame.
    ///
    /// Units: meters
    pub offset_x_m: f64,
    pub offset_y_m: f64,

    /// Angle of the module's encoder zero in the chassis frame.
    ///
    /// Units: degrees
    pub angular_offset_deg: f64,

    pub drive_motor_id: u8,
    pub steer_motor_id: u8,
    pub encoder_id: u8
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors found while validating the parameters.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("{0} must be positive, found {1}")]
    NonPositive(&'static str, f64),

    #[error("Module {0} should be {1:?} but is {2:?}, modules must be in FL, FR, RL, RR order")]
    ModuleOrder(usize, ModuleId, ModuleId),

    #[error("The {0:?} module's {1} id ({2}) is outside the bus range 0..={3}")]
    IdOutOfRange(ModuleId, &'static str, u8, u8),

    #[error("Motor id {0} is used more than once")]
    DuplicateMotorId(u8),

    #[error("Encoder id {0} is used more than once")]
    DuplicateEncoderId(u8),

    #[error("The {0:?} module's angular offset is not finite")]
    NonFiniteOffset(ModuleId),

    #[error("Invalid module calibration: {0}")]
    InvalidCal(String)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters are consistent.
    ///
    /// Motor ids must be unique across all motors and encoder ids unique
    /// across all encoders. Motors and encoders are different device types so
    /// a motor and an encoder may share an id.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let positive = [
            ("max_speed_ms", self.max_speed_ms),
            ("max_angular_speed_rads", self.max_angular_speed_rads),
            ("cmd_timeout_s", self.cmd_timeout_s)
        ];

        for (name, value) in positive.iter() {
            if !(value.is_finite() && *value > 0.0) {
                return Err(ParamsError::NonPositive(*name, *value))
            }
        }

        self.module_cal.validate().map_err(ParamsError::InvalidCal)?;

        let mut motor_ids = HashSet::new();
        let mut encoder_ids = HashSet::new();

        for (i, (m, expected)) in self.modules.iter().zip(ModuleId::ALL.iter()).enumerate() {
            if m.id != *expected {
                return Err(ParamsError::ModuleOrder(i, *expected, m.id))
            }

            if !m.angular_offset_deg.is_finite() {
                return Err(ParamsError::NonFiniteOffset(m.id))
            }

            for (name, dev_id) in [
                ("drive motor", m.drive_motor_id),
                ("steer motor", m.steer_motor_id),
                ("encoder", m.encoder_id)
            ].iter() {
                if *dev_id > MAX_CAN_ID {
                    return Err(ParamsError::IdOutOfRange(m.id, *name, *dev_id, MAX_CAN_ID))
                }
            }

            for dev_id in [m.drive_motor_id, m.steer_motor_id].iter() {
                if !motor_ids.insert(*dev_id) {
                    return Err(ParamsError::DuplicateMotorId(*dev_id))
                }
            }

            if !encoder_ids.insert(m.encoder_id) {
                return Err(ParamsError::DuplicateEncoderId(m.encoder_id))
            }
        }

        Ok(())
    }

    /// The module positions in `ModuleId` order.
    pub fn geometry(&self) -> [ModuleGeometry; NUM_MODULES] {
        let mut geom = [ModuleGeometry::default(); NUM_MODULES];

        for (g, m) in geom.iter_mut().zip(self.modules.iter()) {
            *g = ModuleGeometry::new(m.offset_x_m, m.offset_y_m);
        }

        geom
    }

    /// Build the full configuration of a module.
    pub fn module_config(&self, id: ModuleId) -> ModuleConfig {
        let m = &self.modules[id.index()];

        ModuleConfig {
            id,
            geometry: ModuleGeometry::new(m.offset_x_m, m.offset_y_m),
            angular_offset_rad: m.angular_offset_deg.to_radians(),
            device_ids: m.device_ids(),
            sensor_fault_limit: self.sensor_fault_limit,
            cal: self.module_cal.clone()
        }
    }
}

impl ModuleParams {
    pub fn device_ids(&self) -> DeviceIds {
        DeviceIds {
            drive_motor: self.drive_motor_id,
            steer_motor: self.steer_motor_id,
            encoder: self.encoder_id
        }
    }
}

/// The parameters shipped in `params/drive_ctrl.toml`, for tests.
#[cfg(test)]
pub(crate) fn test_params() -> Params {
    util::params::from_str(include_str!("../../../params/drive_ctrl.toml"))
        .expect("params/drive_ctrl.toml should parse")
}
