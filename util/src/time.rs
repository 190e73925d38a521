//! General time utility functions

use chrono;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Convert a cycle frequency into the matching cycle period in seconds.
///
/// A non-positive frequency has no period and returns `None`.
pub fn period_from_hz(frequency_hz: f64) -> Option<f64> {
    if frequency_hz > 0.0 && frequency_hz.is_finite() {
        Some(1.0 / frequency_hz)
    }
    else {
        None
    }
}
