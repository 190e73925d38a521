//! Drive control module
//!
//! Coordinates the four swerve modules: converts chassis motion requests into
//! module targets, runs the module loops and keeps the odometry pose up to
//! date every cycle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cmd;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use cmd::*;
pub use params::*;
pub use state::*;

use crate::kinematics::KinematicsError;
use crate::module_ctrl::ModuleCtrlError;
use crate::sensing::SensorError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The largest device id on the CAN bus.
pub const MAX_CAN_ID: u8 = 62;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur while building DriveCtrl.
#[derive(Debug, thiserror::Error)]
pub enum DriveCtrlError {
    #[error("Invalid drive parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("Invalid module geometry: {0}")]
    Kinematics(#[from] KinematicsError),

    #[error("Could not initialise a module: {0}")]
    Module(#[from] ModuleCtrlError),

    #[error("Could not take the initial heading reading: {0}")]
    InitialHeading(SensorError)
}
