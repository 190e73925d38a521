//! PID controller used by the module loops

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::PidGains;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller with a fixed, caller-supplied time step.
#[derive(Debug, Clone, Serialize)]
pub struct PidController {
    /// Gains and output limits
    gains: PidGains,

    /// Current mode of the loop
    mode: PidMode,

    /// Target of the loop
    setpoint: f64,

    /// Previous error
    prev_error: Option<f64>,

    /// The integral accumulation
    integral: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Mode of a PID loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PidMode {
    /// No setpoint has been given, the loop outputs zero.
    Idle,

    /// The loop is tracking its setpoint.
    Tracking
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {

    /// Create a new idle controller with the given gains.
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            mode: PidMode::Idle,
            setpoint: 0.0,
            prev_error: None,
            integral: 0.0
        }
    }

    /// Set the target of the loop, starting tracking if the loop was idle.
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
        self.mode = PidMode::Tracking;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn mode(&self) -> PidMode {
        self.mode
    }

    /// Return the loop to idle, clearing the integral and derivative history.
    pub fn reset(&mut self) {
        self.mode = PidMode::Idle;
        self.setpoint = 0.0;
        self.prev_error = None;
        self.integral = 0.0;
    }

    /// Get the output of the controller for the given error.
    ///
    /// `feedforward` is added to the PID terms before the output limits are
    /// applied. An idle loop always outputs zero.
    pub fn get(&mut self, feedforward: f64, error: f64, dt_s: f64) -> f64 {
        if self.mode == PidMode::Idle {
            return 0.0
        }

        // A bad time step cannot be used for integration or differentiation,
        // so only the proportional term is used.
        let dt = if dt_s.is_finite() && dt_s > 0.0 { Some(dt_s) } else { None };

        // Accumulate the integral term.
        self.integral += match dt {
            Some(t) => error * t,
            None => 0.0
        };

        // Calculate the derivative. The first tracking sample has no previous
        // error so there is no derivative.
        let deriv = match (self.prev_error, dt) {
            (Some(e), Some(t)) => (error - e) / t,
            _ => 0.0
        };

        self.prev_error = Some(error);

        let out = feedforward
            + self.gains.k_p * error
            + self.gains.k_i * self.integral
            + self.gains.k_d * deriv;

        util::maths::clamp(&out, &self.gains.min_output, &self.gains.max_output)
    }
}
