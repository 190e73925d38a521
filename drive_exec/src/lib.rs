//! # Drive library.
//!
//! This library allows other crates in the workspace to access items defined inside the drive
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command slot - single-writer single-reader latest value handoff between threads
pub mod cmd_slot;

/// Drive control module - coordinates the four modules and keeps the pose up to date
pub mod drive_ctrl;

/// Heading sensor interface
pub mod heading;

/// Kinematics module - converts between chassis motion and module states
pub mod kinematics;

/// Module control module - closes the speed and angle loops of a single swerve module
pub mod module_ctrl;

/// Pose estimation module - integrates wheel odometry and heading into a pose
pub mod pose_est;

/// Sensor fault handling
pub mod sensing;

/// Simulated drive hardware
pub mod sim;

/// Drive telemetry
pub mod tm;
