//! Swerve kinematics module
//!
//! Converts between chassis-level motion (forward, strafe and rotate) and the
//! speed and angle of each of the four swerve modules.
//!
//! # Frames
//!
//! All quantities are given in the chassis frame: x is forward, y is to the
//! left and positive rotation is counter-clockwise when viewed from above.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod swerve;
mod types;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
pub use swerve::*;
pub use types::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of swerve modules on the chassis.
pub const NUM_MODULES: usize = 4;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Identifies a module on the chassis.
///
/// Every four element array in the drive software is indexed in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleId {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight
}

/// Possible errors that can occur while building the kinematics.
#[derive(Debug, thiserror::Error)]
pub enum KinematicsError {
    #[error("The {0:?} module's offset is not finite: ({1}, {2})")]
    NonFiniteOffset(ModuleId, f64, f64),

    #[error(
        "The {0:?} module's offset ({1}, {2}) is not in its quadrant, expected \
        x {3} 0 and y {4} 0")]
    WrongQuadrant(ModuleId, f64, f64, &'static str, &'static str),

    #[error("The module geometry is degenerate, the chassis motion cannot be recovered")]
    Degenerate
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModuleId {
    /// All modules in array order.
    pub const ALL: [ModuleId; NUM_MODULES] = [
        ModuleId::FrontLeft,
        ModuleId::FrontRight,
        ModuleId::RearLeft,
        ModuleId::RearRight
    ];

    /// The index of this module in four element arrays.
    pub fn index(&self) -> usize {
        match self {
            ModuleId::FrontLeft => 0,
            ModuleId::FrontRight => 1,
            ModuleId::RearLeft => 2,
            ModuleId::RearRight => 3
        }
    }

    /// Get the sign the module's (x, y) offset must have.
    pub fn quadrant(&self) -> (f64, f64) {
        match self {
            ModuleId::FrontLeft => (1.0, 1.0),
            ModuleId::FrontRight => (1.0, -1.0),
            ModuleId::RearLeft => (-1.0, 1.0),
            ModuleId::RearRight => (-1.0, -1.0)
        }
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
