//! Swerve module control module
//!
//! Each swerve module has a drive motor, a steer motor and an absolute
//! encoder on the steering output. `ModuleCtrl` runs a velocity loop on the
//! drive motor and a position loop on the steer motor, taking the shortest
//! path to each new angle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod io;
mod optimise;
mod params;
mod pid;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use io::*;
pub use optimise::*;
pub use params::*;
pub use pid::*;
pub use state::*;

use crate::kinematics::ModuleId;
use crate::sensing::SensorError;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur while building a module controller.
#[derive(Debug, thiserror::Error)]
pub enum ModuleCtrlError {
    #[error("Invalid calibration for the {0:?} module: {1}")]
    InvalidCal(ModuleId, String),

    #[error(
        "The {0:?} module was given hardware with device ids {1:?} but is \
        configured for {2:?}, are the modules swapped?")]
    DeviceMismatch(ModuleId, DeviceIds, DeviceIds),

    #[error("Could not set the {0:?} module's current limits: {1}")]
    CurrentLimitError(ModuleId, HwError),

    #[error("Could not take the initial {1} reading for the {0:?} module: {2}")]
    InitialReadFailed(ModuleId, &'static str, SensorError)
}
