//! Calibration and configuration of a swerve module

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::kinematics::{ModuleGeometry, ModuleId};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains and output limits of a PID loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidGains {
    pub k_p: f64,
    pub k_i: f64,
    pub k_d: f64,

    /// Lowest output of the loop, normalised.
    pub min_output: f64,

    /// Highest output of the loop, normalised.
    pub max_output: f64
}

/// Calibration shared by all modules of the same type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleCal {

    // ---- DRIVE ----

    /// Units: meters
    pub wheel_diameter_m: f64,

    /// Drive motor revolutions per wheel revolution.
    pub drive_reduction: f64,

    /// Free speed of the drive motor.
    ///
    /// Units: revolutions/minute
    pub drive_motor_free_speed_rpm: f64,

    /// Gains for the drive velocity loop, acting on the wheel ground speed
    /// error in meters/second.
    pub drive_gains: PidGains,

    /// Units: amps
    pub drive_current_limit_a: f64,

    // ---- STEER ----

    /// Steer motor revolutions per steering output revolution.
    pub steer_reduction: f64,

    /// Free speed of the steer motor.
    ///
    /// Units: revolutions/minute
    pub steer_motor_free_speed_rpm: f64,

    /// True if the absolute encoder counts opposite to the chassis frame,
    /// i.e. clockwise.
    pub steer_encoder_inverted: bool,

    /// Gains for the steer position loop, acting on the angle error in
    /// radians.
    pub steer_gains: PidGains,

    /// Units: amps
    pub steer_current_limit_a: f64
}

/// Identifiers of the devices making up a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIds {
    pub drive_motor: u8,
    pub steer_motor: u8,
    pub encoder: u8
}

/// Full configuration of a single module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleConfig {
    pub id: ModuleId,

    pub geometry: ModuleGeometry,

    /// Angle of the module's encoder zero in the chassis frame, i.e. the
    /// encoder reads `chassis angle + offset`.
    ///
    /// Units: radians
    pub angular_offset_rad: f64,

    pub device_ids: DeviceIds,

    /// Number of consecutive faulted samples any of the module's sensors may
    /// give before the module reports the fault limit as exceeded.
    pub sensor_fault_limit: u32,

    pub cal: ModuleCal
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidGains {
    /// Check that the gains are usable, returning a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.k_p.is_finite() && self.k_i.is_finite() && self.k_d.is_finite()) {
            return Err(format!("gains must be finite, found {:?}", self))
        }
        if !(self.min_output < self.max_output) {
            return Err(format!(
                "min_output ({}) must be less than max_output ({})",
                self.min_output, self.max_output
            ))
        }
        if self.min_output < -1.0 || self.max_output > 1.0 {
            return Err(format!(
                "output limits ({}, {}) must lie within [-1, 1]",
                self.min_output, self.max_output
            ))
        }

        Ok(())
    }
}

impl ModuleCal {
    /// Check that the calibration is physically meaningful.
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("wheel_diameter_m", self.wheel_diameter_m),
            ("drive_reduction", self.drive_reduction),
            ("drive_motor_free_speed_rpm", self.drive_motor_free_speed_rpm),
            ("drive_current_limit_a", self.drive_current_limit_a),
            ("steer_reduction", self.steer_reduction),
            ("steer_motor_free_speed_rpm", self.steer_motor_free_speed_rpm),
            ("steer_current_limit_a", self.steer_current_limit_a)
        ];

        for (name, value) in positive.iter() {
            if !(value.is_finite() && *value > 0.0) {
                return Err(format!("{} must be positive, found {}", name, value))
            }
        }

        self.drive_gains.validate().map_err(|e| format!("drive_gains: {}", e))?;
        self.steer_gains.validate().map_err(|e| format!("steer_gains: {}", e))?;

        Ok(())
    }

    /// Wheel travel per drive motor revolution.
    ///
    /// Units: meters
    pub fn drive_m_per_rot(&self) -> f64 {
        self.wheel_diameter_m * PI / self.drive_reduction
    }

    /// Wheel ground speed per drive motor rpm.
    ///
    /// Units: (meters/second)/rpm
    pub fn drive_ms_per_rpm(&self) -> f64 {
        self.drive_m_per_rot() / 60.0
    }

    /// The ground speed of the wheel when the drive motor runs at its free
    /// speed.
    ///
    /// Units: meters/second
    pub fn drive_free_speed_ms(&self) -> f64 {
        self.drive_motor_free_speed_rpm * self.drive_ms_per_rpm()
    }

    /// Velocity feedforward gain mapping a speed target onto a normalised
    /// demand.
    pub fn drive_k_ff(&self) -> f64 {
        1.0 / self.drive_free_speed_ms()
    }

    /// The rate of the steering output at the steer motor's free speed.
    ///
    /// Units: radians/second
    pub fn steer_free_rate_rads(&self) -> f64 {
        self.steer_motor_free_speed_rpm / 60.0 * 2.0 * PI / self.steer_reduction
    }
}
