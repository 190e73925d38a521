//! Commands accepted by DriveCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::pose_est::RobotPose;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A command for the drive.
///
/// In JSON (as used by drive scripts and the command line) these look like
/// `"Stop"`, `{"Drive": {"vx": 0.5, "vy": 0.0, "omega": 0.1,
/// "field_relative": true}}` or `{"ResetOdometry": {"x_m": 0.0, "y_m": 0.0,
/// "heading_rad": 0.0}}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DriveCmd {
    /// No new command this cycle, keep doing what was last commanded.
    None,

    /// Stop all wheels, holding the steering angles.
    Stop,

    /// Drive the chassis.
    ///
    /// `vx` (forward), `vy` (left) and `omega` (counter-clockwise) are
    /// normalised to [-1, 1] of the maximum linear and angular speeds. Values
    /// outside that range are clamped.
    Drive {
        vx: f64,
        vy: f64,
        omega: f64,
        field_relative: bool
    },

    /// Stop and point the wheels into an X to resist being pushed.
    LockX,

    /// Reset the heading sensor to zero.
    ZeroHeading,

    /// Reset the odometry to the given pose.
    ResetOdometry(RobotPose),

    /// Zero the drive encoders.
    ResetEncoders
}

impl Default for DriveCmd {
    fn default() -> Self {
        DriveCmd::None
    }
}
