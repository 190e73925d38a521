//! Actuator and sensor interface of a swerve module

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::DeviceIds;
use crate::sensing::SensorError;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Hardware of a single swerve module.
///
/// Demands are normalised outputs in [-1, 1]. A positive steer demand turns
/// the module counter-clockwise in the encoder's frame, i.e. it increases the
/// angle read from the (possibly inverted) absolute encoder.
pub trait ModuleIo {
    /// Identifiers of the devices behind this interface.
    fn device_ids(&self) -> DeviceIds;

    /// Configure the motor current limits. Called once during construction.
    ///
    /// Units: amps
    fn set_current_limits(&mut self, drive_a: f64, steer_a: f64) -> Result<(), HwError>;

    /// Set the normalised drive motor output.
    fn set_drive_demand(&mut self, demand: f64);

    /// Set the normalised steer motor output.
    fn set_steer_demand(&mut self, demand: f64);

    /// Absolute position of the steering output, one revolution of the
    /// steering is 1.0.
    ///
    /// Units: revolutions, in [0, 1)
    fn steer_abs_position_rot(&mut self) -> Result<f64, SensorError>;

    /// Cumulative position of the drive motor, before gearing.
    ///
    /// Units: revolutions
    fn drive_position_rot(&mut self) -> Result<f64, SensorError>;

    /// Velocity of the drive motor, before gearing.
    ///
    /// Units: revolutions/minute
    fn drive_velocity_rpm(&mut self) -> Result<f64, SensorError>;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while configuring module hardware.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HwError {
    #[error("Device {0} did not acknowledge the configuration")]
    NotAcknowledged(u8),

    #[error("Device {0} rejected the value {1}")]
    Rejected(u8, f64)
}
