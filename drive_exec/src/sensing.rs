//! Sensor fault handling
//!
//! Sensor reads on the drive can fail transiently (a missed CAN frame, a
//! brownout on a sensor). Rather than failing the whole control cycle the last
//! good value is held and consecutive faults are counted, so that the caller
//! can decide when a sensor has been lost for too long.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{error, info, warn};
use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A sensor reading which holds its last good value through faults.
#[derive(Debug, Clone, Serialize)]
pub struct HeldReading {
    /// Name used when logging faults.
    name: String,

    /// The last good value.
    value: f64,

    /// Whether the most recent sample was a fault.
    faulted: bool,

    /// Number of consecutive faulted samples.
    consecutive_faults: u32,

    /// Number of consecutive faults allowed before the reading is considered
    /// lost.
    fault_limit: u32
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors returned by a sensor read.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("The sensor did not respond in time")]
    Timeout,

    #[error("The sensor is not connected")]
    NotConnected,

    #[error("The sensor returned an invalid value: {0}")]
    InvalidValue(f64),

    #[error("The sensor reported a fault: {0}")]
    Device(String)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HeldReading {
    /// Create a new reading starting from a known good value.
    pub fn new(name: &str, initial: f64, fault_limit: u32) -> Self {
        Self {
            name: name.to_string(),
            value: initial,
            faulted: false,
            consecutive_faults: 0,
            fault_limit
        }
    }

    /// Update the reading from a new sample and return the held value.
    ///
    /// Non-finite samples are treated as faults.
    pub fn update(&mut self, sample: Result<f64, SensorError>) -> f64 {
        let sample = match sample {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(v) => Err(SensorError::InvalidValue(v)),
            Err(e) => Err(e)
        };

        match sample {
            Ok(v) => {
                if self.consecutive_faults > 0 {
                    info!(
                        "{} recovered after {} faulted samples",
                        self.name, self.consecutive_faults
                    );
                }
                self.value = v;
                self.faulted = false;
                self.consecutive_faults = 0;
            },
            Err(e) => {
                self.faulted = true;
                self.consecutive_faults = self.consecutive_faults.saturating_add(1);

                if self.consecutive_faults == 1 {
                    warn!("{} read failed, holding {}: {}", self.name, self.value, e);
                }
                if self.consecutive_faults == self.fault_limit.saturating_add(1) {
                    error!(
                        "{} has faulted on more than {} consecutive samples",
                        self.name, self.fault_limit
                    );
                }
            }
        }

        self.value
    }

    /// Overwrite the held value, for when the sensor itself has been reset.
    /// The fault count is unchanged.
    pub fn reset_to(&mut self, value: f64) {
        self.value = value;
    }

    /// The held value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Whether the latest sample was a fault.
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn consecutive_faults(&self) -> u32 {
        self.consecutive_faults
    }

    /// Whether the reading has faulted more than the limit in a row.
    pub fn limit_exceeded(&self) -> bool {
        self.consecutive_faults > self.fault_limit
    }
}
