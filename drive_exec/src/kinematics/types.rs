//! Data types passed through the kinematics

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The velocity of the chassis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    /// Forward speed.
    ///
    /// Units: meters/second
    pub vx_ms: f64,

    /// Leftward speed.
    ///
    /// Units: meters/second
    pub vy_ms: f64,

    /// Counter-clockwise rotation rate.
    ///
    /// Units: radians/second
    pub omega_rads: f64
}

/// The position of a module's steer axis in the chassis frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleGeometry {
    /// Units: meters
    pub offset_x_m: f64,

    /// Units: meters
    pub offset_y_m: f64
}

/// Speed and angle of a single module.
///
/// The angle is range free, any real value is interpreted modulo 2pi.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// Signed wheel ground speed.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// Wheel angle from the chassis x axis.
    ///
    /// Units: radians
    pub angle_rad: f64
}

/// Cumulative travel and angle of a single module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    /// Signed wheel travel since the encoders were last reset.
    ///
    /// Units: meters
    pub distance_m: f64,

    /// Units: radians
    pub angle_rad: f64
}

/// An incremental displacement of the chassis, expressed in the chassis frame
/// at the start of the increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Twist2 {
    pub dx_m: f64,
    pub dy_m: f64,
    pub dtheta_rad: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ChassisSpeeds {
    pub fn new(vx_ms: f64, vy_ms: f64, omega_rads: f64) -> Self {
        Self {
            vx_ms,
            vy_ms,
            omega_rads
        }
    }

    /// Build chassis speeds from a field-relative velocity.
    ///
    /// `vx_ms` and `vy_ms` are along the field axes, `heading_rad` is the
    /// robot's current heading in the field.
    pub fn from_field_relative(
        vx_ms: f64,
        vy_ms: f64,
        omega_rads: f64,
        heading_rad: f64
    ) -> Self {
        let v_chassis = Rotation2::new(-heading_rad) * Vector2::new(vx_ms, vy_ms);

        Self {
            vx_ms: v_chassis.x,
            vy_ms: v_chassis.y,
            omega_rads
        }
    }

    /// True if every component is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.vx_ms == 0.0 && self.vy_ms == 0.0 && self.omega_rads == 0.0
    }
}

impl ModuleGeometry {
    pub fn new(offset_x_m: f64, offset_y_m: f64) -> Self {
        Self {
            offset_x_m,
            offset_y_m
        }
    }
}

impl ModuleState {
    pub fn new(speed_ms: f64, angle_rad: f64) -> Self {
        Self {
            speed_ms,
            angle_rad
        }
    }

    /// Build a state with the angle given in degrees.
    pub fn from_degrees(speed_ms: f64, angle_deg: f64) -> Self {
        Self::new(speed_ms, angle_deg.to_radians())
    }
}

impl ModulePosition {
    pub fn new(distance_m: f64, angle_rad: f64) -> Self {
        Self {
            distance_m,
            angle_rad
        }
    }
}
