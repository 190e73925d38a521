//! Drive telemetry
//!
//! A `DriveTm` frame is produced every cycle and handed to an optional
//! `TelemetrySink`. Sinks are write-only: a failing sink is reported but never
//! changes what the drive does.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use crate::kinematics::ModuleId;
use util::{archive::{ArchiveError, Archiver}, logger::TM_LOG_TARGET, session::Session};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A destination for drive telemetry.
pub trait TelemetrySink {
    /// Publish a single telemetry frame.
    fn publish(&mut self, tm: &DriveTm) -> Result<(), TmError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Telemetry frame for one cycle of the drive.
///
/// The frame is kept flat so that it can be written as a single CSV row.
/// Steering positions are given both in the chassis frame ("relative") and as
/// read by the module's absolute encoder ("absolute").
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DriveTm {
    /// Time since the drive started.
    ///
    /// Units: seconds
    pub time_s: f64,

    pub fl_steer_rel_rad: f64,
    pub fl_steer_abs_rad: f64,
    pub fl_speed_ms: f64,
    pub fr_steer_rel_rad: f64,
    pub fr_steer_abs_rad: f64,
    pub fr_speed_ms: f64,
    pub rl_steer_rel_rad: f64,
    pub rl_steer_abs_rad: f64,
    pub rl_speed_ms: f64,
    pub rr_steer_rel_rad: f64,
    pub rr_steer_abs_rad: f64,
    pub rr_speed_ms: f64,

    /// Continuous heading sensor angle.
    pub gyro_angle_deg: f64,

    /// Wrapped heading sensor angle.
    pub gyro_yaw_deg: f64,

    pub turn_rate_degs: f64,

    pub pose_x_m: f64,
    pub pose_y_m: f64,
    pub pose_heading_rad: f64,

    /// The last drive request had to be desaturated.
    pub desaturated: bool
}

/// Writes telemetry to a CSV file in the session archive.
pub struct ArchiveSink {
    archiver: Archiver
}

/// Writes telemetry to the log at trace level, under the telemetry target.
#[derive(Debug, Default)]
pub struct LogSink;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmError {
    #[error("Could not archive telemetry: {0}")]
    Archive(ArchiveError),

    #[error("Could not serialise telemetry: {0}")]
    Serialise(serde_json::Error)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveTm {
    /// Set the steering and speed fields of the given module.
    pub fn set_module(&mut self, id: ModuleId, rel_rad: f64, abs_rad: f64, speed_ms: f64) {
        let fields = match id {
            ModuleId::FrontLeft => (
                &mut self.fl_steer_rel_rad, &mut self.fl_steer_abs_rad, &mut self.fl_speed_ms
            ),
            ModuleId::FrontRight => (
                &mut self.fr_steer_rel_rad, &mut self.fr_steer_abs_rad, &mut self.fr_speed_ms
            ),
            ModuleId::RearLeft => (
                &mut self.rl_steer_rel_rad, &mut self.rl_steer_abs_rad, &mut self.rl_speed_ms
            ),
            ModuleId::RearRight => (
                &mut self.rr_steer_rel_rad, &mut self.rr_steer_abs_rad, &mut self.rr_speed_ms
            )
        };

        *fields.0 = rel_rad;
        *fields.1 = abs_rad;
        *fields.2 = speed_ms;
    }

    /// Get the steering (relative, absolute) positions of the given module.
    pub fn module_steering(&self, id: ModuleId) -> (f64, f64) {
        match id {
            ModuleId::FrontLeft => (self.fl_steer_rel_rad, self.fl_steer_abs_rad),
            ModuleId::FrontRight => (self.fr_steer_rel_rad, self.fr_steer_abs_rad),
            ModuleId::RearLeft => (self.rl_steer_rel_rad, self.rl_steer_abs_rad),
            ModuleId::RearRight => (self.rr_steer_rel_rad, self.rr_steer_abs_rad)
        }
    }

    /// The frame as a list of named dashboard values.
    pub fn named_values(&self) -> Vec<(String, f64)> {
        let mut values = Vec::with_capacity(14);

        for id in ModuleId::ALL.iter() {
            let (rel, abs) = self.module_steering(*id);
            values.push((format!("Drive/Swerve/{}/SteeringRelativePosition", id), rel));
            values.push((format!("Drive/Swerve/{}/SteeringAbsolutePosition", id), abs));
        }

        values.push(("Drive/Gyro/Angle".to_string(), self.gyro_angle_deg));
        values.push(("Drive/Gyro/Yaw".to_string(), self.gyro_yaw_deg));
        values.push(("Drive/Gyro/Rate".to_string(), self.turn_rate_degs));
        values.push(("Drive/Pose/X".to_string(), self.pose_x_m));
        values.push(("Drive/Pose/Y".to_string(), self.pose_y_m));
        values.push(("Drive/Pose/Heading".to_string(), self.pose_heading_rad));

        values
    }
}

impl ArchiveSink {
    /// Create a new sink writing to `path` in the session's archive
    /// directory.
    pub fn new(session: &Session, path: &str) -> Result<Self, TmError> {
        Ok(Self {
            archiver: Archiver::from_path(session, path).map_err(TmError::Archive)?
        })
    }

    /// Create a sink from an already open archiver.
    pub fn from_archiver(archiver: Archiver) -> Self {
        Self {
            archiver
        }
    }
}

impl TelemetrySink for ArchiveSink {
    fn publish(&mut self, tm: &DriveTm) -> Result<(), TmError> {
        self.archiver.serialise(tm).map_err(TmError::Archive)
    }
}

impl TelemetrySink for LogSink {
    fn publish(&mut self, tm: &DriveTm) -> Result<(), TmError> {
        let s = serde_json::to_string(tm).map_err(TmError::Serialise)?;
        trace!(target: TM_LOG_TARGET, "{}", s);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_named_values() {
        let mut tm = DriveTm::default();
        tm.set_module(ModuleId::RearLeft, 1.0, 2.0, 3.0);
        tm.gyro_yaw_deg = -45.0;

        let values = tm.named_values();
        assert_eq!(values.len(), 14);
        assert!(values.contains(
            &("Drive/Swerve/RearLeft/SteeringRelativePosition".to_string(), 1.0)
        ));
        assert!(values.contains(
            &("Drive/Swerve/RearLeft/SteeringAbsolutePosition".to_string(), 2.0)
        ));
        assert!(values.contains(&("Drive/Gyro/Yaw".to_string(), -45.0)));
        assert_eq!(tm.rl_speed_ms, 3.0);
    }

    #[test]
    fn test_unopened_archive_sink_fails() {
        let mut sink = ArchiveSink::from_archiver(Archiver::default());
        assert!(matches!(
            sink.publish(&DriveTm::default()),
            Err(TmError::Archive(ArchiveError::NotOpen))
        ));
    }

    #[test]
    fn test_log_sink() {
        assert!(LogSink.publish(&DriveTm::default()).is_ok());
    }
}
