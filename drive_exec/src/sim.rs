//! Simulated drive hardware
//!
//! Simple models of the module hardware and heading sensor, used to run the
//! drive without a robot. The models are deliberately simple: the drive
//! motor is a first order lag towards the demanded fraction of its free
//! speed and the steering turns at the demanded fraction of its free rate.
//! Faults can be injected into every sensor.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::f64::consts::TAU;

// Internal
use crate::drive_ctrl::{DriveCtrl, DriveCtrlError, Params};
use crate::heading::HeadingSensor;
use crate::kinematics::{ChassisSpeeds, ModuleId, ModuleState, Twist2, NUM_MODULES};
use crate::module_ctrl::{DeviceIds, HwError, ModuleCal, ModuleConfig, ModuleIo};
use crate::pose_est::RobotPose;
use crate::sensing::SensorError;
use util::maths::{clamp, wrap_2pi};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Time constant of the drive motor's response.
///
/// Units: seconds
pub const DRIVE_TIME_CONST_S: f64 = 0.05;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Number of upcoming reads of each sensor which will fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimFaults {
    pub steer: u32,
    pub drive_pos: u32,
    pub drive_vel: u32
}

/// Simulated module hardware.
#[derive(Debug, Clone)]
pub struct SimModuleIo {
    ids: DeviceIds,
    cal: ModuleCal,

    /// Angle of the encoder zero in the chassis frame.
    mount_offset_rad: f64,

    /// True steering angle in the chassis frame, continuous.
    steer_angle_rad: f64,

    /// True wheel ground speed.
    wheel_speed_ms: f64,

    /// True wheel travel.
    wheel_distance_m: f64,

    drive_demand: f64,
    steer_demand: f64,

    current_limits: Option<(f64, f64)>,

    /// Reject any current limit configuration.
    pub reject_current_limits: bool,

    /// Faults to inject into the next sensor reads.
    pub faults: SimFaults
}

/// Simulated heading sensor.
#[derive(Debug, Clone, Default)]
pub struct SimHeading {
    /// Continuous heading, counter-clockwise.
    angle_deg: f64,

    rate_degs: f64,

    /// Number of upcoming reads which will fail.
    pub faults: u32
}

/// True state of the simulated chassis, integrated from the true module
/// states.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimChassis {
    pub pose: RobotPose,
    pub speeds: ChassisSpeeds
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimModuleIo {
    /// Create simulated hardware matching the given configuration, with the
    /// steering initially at `initial_angle_rad` in the chassis frame.
    pub fn new(config: &ModuleConfig, initial_angle_rad: f64) -> Self {
        Self {
            ids: config.device_ids,
            cal: config.cal.clone(),
            mount_offset_rad: config.angular_offset_rad,
            steer_angle_rad: initial_angle_rad,
            wheel_speed_ms: 0.0,
            wheel_distance_m: 0.0,
            drive_demand: 0.0,
            steer_demand: 0.0,
            current_limits: None,
            reject_current_limits: false,
            faults: SimFaults::default()
        }
    }

    /// Advance the hardware by `dt_s`.
    pub fn step(&mut self, dt_s: f64) {
        let target_ms = self.drive_demand * self.cal.drive_free_speed_ms();
        let alpha = clamp(&(dt_s / DRIVE_TIME_CONST_S), &0.0, &1.0);
        self.wheel_speed_ms += (target_ms - self.wheel_speed_ms) * alpha;
        self.wheel_distance_m += self.wheel_speed_ms * dt_s;

        self.steer_angle_rad += self.steer_demand * self.cal.steer_free_rate_rads() * dt_s;
    }

    /// The true speed and angle of the module.
    pub fn true_state(&self) -> ModuleState {
        ModuleState::new(self.wheel_speed_ms, self.steer_angle_rad)
    }

    pub fn wheel_distance_m(&self) -> f64 {
        self.wheel_distance_m
    }

    pub fn current_limits(&self) -> Option<(f64, f64)> {
        self.current_limits
    }

    pub fn demands(&self) -> (f64, f64) {
        (self.drive_demand, self.steer_demand)
    }

    /// Swap the identity of this hardware, as if it were plugged in as a
    /// different module.
    pub fn set_device_ids(&mut self, ids: DeviceIds) {
        self.ids = ids;
    }
}

impl ModuleIo for SimModuleIo {
    fn device_ids(&self) -> DeviceIds {
        self.ids
    }

    fn set_current_limits(&mut self, drive_a: f64, steer_a: f64) -> Result<(), HwError> {
        if self.reject_current_limits {
            return Err(HwError::NotAcknowledged(self.ids.drive_motor))
        }

        self.current_limits = Some((drive_a, steer_a));
        Ok(())
    }

    fn set_drive_demand(&mut self, demand: f64) {
        self.drive_demand = clamp(&demand, &-1.0, &1.0);
    }

    fn set_steer_demand(&mut self, demand: f64) {
        self.steer_demand = clamp(&demand, &-1.0, &1.0);
    }

    fn steer_abs_position_rot(&mut self) -> Result<f64, SensorError> {
        if take_fault(&mut self.faults.steer) {
            return Err(SensorError::Timeout)
        }

        let sensor_rad = self.steer_angle_rad + self.mount_offset_rad;
        let raw_rad = if self.cal.steer_encoder_inverted { -sensor_rad } else { sensor_rad };

        Ok(wrap_2pi(raw_rad) / TAU)
    }

    fn drive_position_rot(&mut self) -> Result<f64, SensorError> {
        if take_fault(&mut self.faults.drive_pos) {
            return Err(SensorError::Timeout)
        }

        Ok(self.wheel_distance_m / self.cal.drive_m_per_rot())
    }

    fn drive_velocity_rpm(&mut self) -> Result<f64, SensorError> {
        if take_fault(&mut self.faults.drive_vel) {
            return Err(SensorError::Timeout)
        }

        Ok(self.wheel_speed_ms / self.cal.drive_ms_per_rpm())
    }
}

impl SimHeading {
    /// Create a sensor reading the given heading.
    pub fn new(angle_deg: f64) -> Self {
        Self {
            angle_deg,
            rate_degs: 0.0,
            faults: 0
        }
    }

    /// Advance the sensor by `dt_s` with the chassis turning at
    /// `omega_rads`.
    pub fn step(&mut self, omega_rads: f64, dt_s: f64) {
        self.rate_degs = omega_rads.to_degrees();
        self.angle_deg += self.rate_degs * dt_s;
    }
}

impl HeadingSensor for SimHeading {
    fn angle_deg(&mut self) -> Result<f64, SensorError> {
        if take_fault(&mut self.faults) {
            return Err(SensorError::NotConnected)
        }
        Ok(self.angle_deg)
    }

    fn yaw_deg(&mut self) -> Result<f64, SensorError> {
        if self.faults > 0 {
            return Err(SensorError::NotConnected)
        }
        Ok((self.angle_deg + 180.0).rem_euclid(360.0) - 180.0)
    }

    fn rate_degs(&mut self) -> Result<f64, SensorError> {
        if self.faults > 0 {
            return Err(SensorError::NotConnected)
        }
        Ok(self.rate_degs)
    }

    fn reset(&mut self) {
        self.angle_deg = 0.0;
    }
}

impl SimChassis {
    /// Advance the chassis by `dt_s` given the true module states.
    pub fn step(
        &mut self,
        drive: &DriveCtrl<SimModuleIo, SimHeading>,
        dt_s: f64
    ) {
        let mut states = [ModuleState::default(); NUM_MODULES];
        for (s, m) in states.iter_mut().zip(drive.modules().iter()) {
            *s = m.io().true_state();
        }

        self.speeds = drive.kinematics().to_chassis_speeds(&states);

        let twist = Twist2 {
            dx_m: self.speeds.vx_ms * dt_s,
            dy_m: self.speeds.vy_ms * dt_s,
            dtheta_rad: self.speeds.omega_rads * dt_s
        };
        self.pose = self.pose.exp(&twist, twist.dtheta_rad);
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Build a drive on simulated hardware, with all wheels pointing forward and
/// the heading at `heading_deg`.
pub fn sim_drive(
    params: Params,
    heading_deg: f64
) -> Result<DriveCtrl<SimModuleIo, SimHeading>, DriveCtrlError> {
    let io = [
        SimModuleIo::new(&params.module_config(ModuleId::FrontLeft), 0.0),
        SimModuleIo::new(&params.module_config(ModuleId::FrontRight), 0.0),
        SimModuleIo::new(&params.module_config(ModuleId::RearLeft), 0.0),
        SimModuleIo::new(&params.module_config(ModuleId::RearRight), 0.0)
    ];

    DriveCtrl::new(params, io, SimHeading::new(heading_deg))
}

/// Advance the simulated hardware by `dt_s` after a drive cycle, returning the
/// true chassis speeds.
pub fn step_sim(
    drive: &mut DriveCtrl<SimModuleIo, SimHeading>,
    chassis: &mut SimChassis,
    dt_s: f64
) -> ChassisSpeeds {
    for m in drive.modules_mut().iter_mut() {
        m.io_mut().step(dt_s);
    }

    chassis.step(drive, dt_s);
    drive.gyro_mut().step(chassis.speeds.omega_rads, dt_s);

    chassis.speeds
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Consume one pending fault, returning true if this read should fail.
fn take_fault(pending: &mut u32) -> bool {
    if *pending > 0 {
        *pending -= 1;
        true
    }
    else {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::drive_ctrl::test_params;

    #[test]
    fn test_encoder_reading() {
        let p = test_params();
        let cfg = p.module_config(ModuleId::FrontLeft);
        let mut io = SimModuleIo::new(&cfg, 0.0);

        // Inverted encoder mounted at -72.7 deg reads +72.7 deg
        let rot = io.steer_abs_position_rot().unwrap();
        assert!((rot * 360.0 - 72.7).abs() < 1e-9);

        io.faults.steer = 1;
        assert!(io.steer_abs_position_rot().is_err());
        assert!(io.steer_abs_position_rot().is_ok());
    }

    #[test]
    fn test_drive_lag() {
        let p = test_params();
        let cfg = p.module_config(ModuleId::RearRight);
        let mut io = SimModuleIo::new(&cfg, 0.0);

        io.set_drive_demand(0.5);
        for _ in 0..100 {
            io.step(0.02);
        }

        let expected = 0.5 * cfg.cal.drive_free_speed_ms();
        assert!((io.true_state().speed_ms - expected).abs() < 1e-6);
        assert!((io.drive_velocity_rpm().unwrap() * cfg.cal.drive_ms_per_rpm() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_heading() {
        let mut h = SimHeading::new(170.0);
        h.step(20f64.to_radians(), 1.0);
        assert!((h.angle_deg().unwrap() - 190.0).abs() < 1e-9);
        assert!((h.yaw_deg().unwrap() + 170.0).abs() < 1e-9);
        assert!((h.rate_degs().unwrap() - 20.0).abs() < 1e-9);

        h.reset();
        assert_eq!(h.angle_deg().unwrap(), 0.0);
    }
}
