//! Heading sensor interface
//!
//! The heading sensor (gyro/IMU) provides the chassis heading used for
//! field-relative driving and odometry.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::sensing::SensorError;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A chassis heading sensor.
///
/// Angles are counter-clockwise positive when viewed from above, matching
/// the chassis frame.
pub trait HeadingSensor {
    /// Continuous (unwrapped) heading since the last reset.
    ///
    /// Units: degrees
    fn angle_deg(&mut self) -> Result<f64, SensorError>;

    /// Heading wrapped into [-180, 180).
    ///
    /// Units: degrees
    fn yaw_deg(&mut self) -> Result<f64, SensorError>;

    /// Rate of change of the heading.
    ///
    /// Units: degrees/second
    fn rate_degs(&mut self) -> Result<f64, SensorError>;

    /// Reset the heading to zero.
    fn reset(&mut self);
}
