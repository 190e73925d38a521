//! Pose estimation module
//!
//! Estimates the pose of the chassis in the world frame from wheel odometry,
//! taking the heading from the heading sensor rather than from the wheels.
//! There is no external correction, so the error grows without bound over
//! time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

// Internal
use crate::kinematics::{ModulePosition, SwerveKinematics, Twist2, NUM_MODULES};
use util::maths::get_ang_dist_2pi;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Below this heading change the exponential map is replaced by its series
/// expansion.
const SMALL_ANGLE_RAD: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Pose of the chassis in the world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotPose {
    /// Units: meters
    pub x_m: f64,

    /// Units: meters
    pub y_m: f64,

    /// Counter-clockwise from the world x axis.
    ///
    /// Units: radians
    pub heading_rad: f64
}

/// Odometry pose estimator.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    kinematics: SwerveKinematics,

    pose: RobotPose,

    /// Module positions at the previous update.
    prev_positions: [ModulePosition; NUM_MODULES],

    /// Heading sensor angle at the previous update.
    prev_sensor_heading_rad: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotPose {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            x_m,
            y_m,
            heading_rad
        }
    }

    /// Apply a chassis-frame twist to this pose, integrating along the
    /// constant curvature arc it describes.
    ///
    /// `dtheta_rad` overrides the twist's own heading change.
    pub fn exp(&self, twist: &Twist2, dtheta_rad: f64) -> Self {
        let (s, c) = if dtheta_rad.abs() < SMALL_ANGLE_RAD {
            (1.0 - dtheta_rad.powi(2) / 6.0, dtheta_rad / 2.0)
        }
        else {
            (dtheta_rad.sin() / dtheta_rad, (1.0 - dtheta_rad.cos()) / dtheta_rad)
        };

        // Displacement in the chassis frame at the start of the twist
        let d_chassis = Vector2::new(
            twist.dx_m * s - twist.dy_m * c,
            twist.dx_m * c + twist.dy_m * s
        );

        let d_world = Rotation2::new(self.heading_rad) * d_chassis;

        Self {
            x_m: self.x_m + d_world.x,
            y_m: self.y_m + d_world.y,
            heading_rad: self.heading_rad + dtheta_rad
        }
    }
}

impl PoseEstimator {

    /// Create a new estimator starting at `initial_pose`.
    ///
    /// `sensor_heading_rad` and `positions` are the current heading sensor
    /// angle and module positions, which are taken as the reference for the
    /// first update.
    pub fn new(
        kinematics: SwerveKinematics,
        sensor_heading_rad: f64,
        positions: &[ModulePosition; NUM_MODULES],
        initial_pose: RobotPose
    ) -> Self {
        Self {
            kinematics,
            pose: initial_pose,
            prev_positions: *positions,
            prev_sensor_heading_rad: sensor_heading_rad
        }
    }

    /// Update the pose from the latest heading and module positions.
    pub fn update(
        &mut self,
        sensor_heading_rad: f64,
        positions: &[ModulePosition; NUM_MODULES]
    ) -> RobotPose {
        let mut deltas = [ModulePosition::default(); NUM_MODULES];

        for ((d, p), prev) in deltas.iter_mut()
            .zip(positions.iter())
            .zip(self.prev_positions.iter())
        {
            *d = ModulePosition::new(p.distance_m - prev.distance_m, p.angle_rad);
        }

        let dheading_rad = get_ang_dist_2pi(self.prev_sensor_heading_rad, sensor_heading_rad);

        self.prev_positions = *positions;
        self.prev_sensor_heading_rad = sensor_heading_rad;

        // No motion, keep the pose exactly as it is
        if dheading_rad == 0.0 && deltas.iter().all(|d| d.distance_m == 0.0) {
            return self.pose
        }

        let twist = self.kinematics.to_twist(&deltas);

        self.pose = self.pose.exp(&twist, dheading_rad);

        self.pose
    }

    /// Overwrite the pose, taking the given heading and positions as the new
    /// reference. The wheel encoders are not touched.
    pub fn reset_position(
        &mut self,
        sensor_heading_rad: f64,
        positions: &[ModulePosition; NUM_MODULES],
        pose: RobotPose
    ) {
        self.prev_positions = *positions;
        self.prev_sensor_heading_rad = sensor_heading_rad;
        self.pose = pose;

        debug!(
            "Odometry reset to ({:.3}, {:.3}) m, {:.1} deg",
            pose.x_m, pose.y_m, pose.heading_rad.to_degrees()
        );
    }

    pub fn pose(&self) -> RobotPose {
        self.pose
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }
}
