//! Implementation of the drive coordinator

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::convert::Infallible;

// Internal
use super::{DriveCmd, DriveCtrlError, Params};
use crate::heading::HeadingSensor;
use crate::kinematics::{
    ChassisSpeeds, ModuleId, ModulePosition, ModuleState, SwerveKinematics, NUM_MODULES
};
use crate::module_ctrl::{ModuleCtrl, ModuleIo, ModuleOutput};
use crate::pose_est::{PoseEstimator, RobotPose};
use crate::sensing::HeldReading;
use crate::tm::{DriveTm, TelemetrySink};
use util::{maths::{clamp, wrap_pi}, module::State};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Module angles forming the locked X stance, in `ModuleId` order.
///
/// Units: degrees
pub const X_STANCE_DEG: [f64; NUM_MODULES] = [45.0, -45.0, -45.0, 45.0];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drive coordinator.
///
/// Owns the four module controllers, in `ModuleId` order, and the heading
/// sensor.
pub struct DriveCtrl<M: ModuleIo, G: HeadingSensor> {
    params: Params,

    modules: [ModuleCtrl<M>; NUM_MODULES],

    gyro: G,
    gyro_angle: HeldReading,
    gyro_yaw: HeldReading,
    gyro_rate: HeldReading,

    pose_est: PoseEstimator,

    /// The states last dispatched to the modules, before optimisation.
    desired: [ModuleState; NUM_MODULES],

    /// The states last dispatched had to be desaturated.
    desaturated: bool,

    tm_sink: Option<Box<dyn TelemetrySink>>,

    /// The sink failed on the last publish.
    tm_failing: bool,

    /// Time accumulated over all cycles.
    time_s: f64,

    report: StatusReport
}

/// Data needed to initialise the drive.
pub struct DriveCtrlInit<M: ModuleIo, G: HeadingSensor> {
    pub params: Params,

    /// Module hardware in `ModuleId` order.
    pub modules: [M; NUM_MODULES],

    pub gyro: G
}

/// Input to one cycle of the drive.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputData {
    /// Command to execute before the cycle runs.
    pub cmd: DriveCmd,

    /// Time since the last cycle.
    ///
    /// Units: seconds
    pub dt_s: f64
}

/// Output of one cycle of the drive.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OutputData {
    pub pose: RobotPose,

    /// Demands written to each module.
    pub module_outputs: [ModuleOutput; NUM_MODULES],

    /// Targets of each module after optimisation.
    pub module_targets: [ModuleState; NUM_MODULES]
}

/// Status of the drive after a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusReport {
    /// The current module targets had to be desaturated.
    pub desaturated: bool,

    /// A heading sensor read failed this cycle.
    pub heading_faulted: bool,

    /// A sensor read failed on the module this cycle.
    pub module_faulted: [bool; NUM_MODULES],

    /// Largest number of consecutive faults of any sensor.
    pub consecutive_faults: u32,

    /// A sensor has faulted for longer than `sensor_fault_limit` cycles.
    pub fault_limit_exceeded: bool,

    /// The telemetry sink failed this cycle.
    pub tm_failed: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<M: ModuleIo, G: HeadingSensor> State for DriveCtrl<M, G> {
    type InitData = DriveCtrlInit<M, G>;
    type InitError = DriveCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = Infallible;

    fn init(init_data: Self::InitData) -> Result<Self, Self::InitError> {
        Self::new(init_data.params, init_data.modules, init_data.gyro)
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        self.exec_cmd(&input_data.cmd);

        let report = self.periodic(input_data.dt_s);

        let mut output = OutputData {
            pose: self.pose(),
            ..Default::default()
        };

        for (i, m) in self.modules.iter().enumerate() {
            output.module_outputs[i] = m.output();
            output.module_targets[i] = m.target().unwrap_or_else(|| m.state());
        }

        Ok((output, report))
    }
}

impl<M: ModuleIo, G: HeadingSensor> DriveCtrl<M, G> {

    /// Create a new drive from its parameters and hardware.
    ///
    /// The hardware must be given in `ModuleId` order, each module's hardware
    /// reporting the device ids configured for that module.
    pub fn new(
        params: Params,
        modules: [M; NUM_MODULES],
        mut gyro: G
    ) -> Result<Self, DriveCtrlError> {
        params.validate()?;

        let kinematics = SwerveKinematics::new(params.geometry())?;

        let [fl, fr, rl, rr] = modules;
        let modules = [
            ModuleCtrl::new(params.module_config(ModuleId::FrontLeft), fl)?,
            ModuleCtrl::new(params.module_config(ModuleId::FrontRight), fr)?,
            ModuleCtrl::new(params.module_config(ModuleId::RearLeft), rl)?,
            ModuleCtrl::new(params.module_config(ModuleId::RearRight), rr)?
        ];

        let limit = params.sensor_fault_limit;
        let angle = initial_read(gyro.angle_deg())?;
        let yaw = initial_read(gyro.yaw_deg())?;
        let rate = initial_read(gyro.rate_degs())?;

        let mut positions = [ModulePosition::default(); NUM_MODULES];
        let mut desired = [ModuleState::default(); NUM_MODULES];
        for ((p, d), m) in positions.iter_mut().zip(desired.iter_mut()).zip(modules.iter()) {
            *p = m.position();
            *d = ModuleState::new(0.0, m.state().angle_rad);
        }

        let pose_est = PoseEstimator::new(
            kinematics,
            angle.to_radians(),
            &positions,
            RobotPose::default()
        );

        info!("DriveCtrl initialised, heading {:.1} deg", angle);

        Ok(Self {
            params,
            modules,
            gyro,
            gyro_angle: HeldReading::new("Gyro angle", angle, limit),
            gyro_yaw: HeldReading::new("Gyro yaw", yaw, limit),
            gyro_rate: HeldReading::new("Gyro rate", rate, limit),
            pose_est,
            desired,
            desaturated: false,
            tm_sink: None,
            tm_failing: false,
            time_s: 0.0,
            report: StatusReport::default()
        })
    }

    /// Attach a telemetry sink, replacing any existing one.
    pub fn set_tm_sink(&mut self, sink: Box<dyn TelemetrySink>) {
        self.tm_sink = Some(sink);
        self.tm_failing = false;
    }

    /// Remove the telemetry sink, returning it if there was one.
    pub fn take_tm_sink(&mut self) -> Option<Box<dyn TelemetrySink>> {
        self.tm_failing = false;
        self.tm_sink.take()
    }

    /// Execute a single command.
    pub fn exec_cmd(&mut self, cmd: &DriveCmd) {
        match *cmd {
            DriveCmd::None => (),
            DriveCmd::Stop => self.stop(),
            DriveCmd::Drive { vx, vy, omega, field_relative } => {
                self.drive(vx, vy, omega, field_relative)
            },
            DriveCmd::LockX => self.set_x(),
            DriveCmd::ZeroHeading => self.zero_heading(),
            DriveCmd::ResetOdometry(pose) => self.reset_odometry(pose),
            DriveCmd::ResetEncoders => self.reset_encoders()
        }
    }

    /// Drive the chassis.
    ///
    /// `vx` (forward), `vy` (left) and `omega` (counter-clockwise) are
    /// normalised to [-1, 1] of the maximum linear and angular speeds. Values
    /// outside that range are clamped and non-finite values taken as zero. If
    /// `field_relative` is set `vx` and `vy` are in the world frame.
    pub fn drive(&mut self, vx: f64, vy: f64, omega: f64, field_relative: bool) {
        let vx = clamp(&vx, &-1.0, &1.0);
        let vy = clamp(&vy, &-1.0, &1.0);
        let omega = clamp(&omega, &-1.0, &1.0);

        let vx_ms = vx * self.params.max_speed_ms;
        let vy_ms = vy * self.params.max_speed_ms;
        let omega_rads = omega * self.params.max_angular_speed_rads;

        let speeds = if field_relative {
            ChassisSpeeds::from_field_relative(
                vx_ms, vy_ms, omega_rads, self.gyro_angle.value().to_radians()
            )
        }
        else {
            ChassisSpeeds::new(vx_ms, vy_ms, omega_rads)
        };

        // No motion requested, hold the wheels where they are
        if speeds.is_zero() {
            self.stop();
            return
        }

        trace!("Chassis speeds demanded: {:?}", speeds);

        let states = self.pose_est.kinematics().to_module_states(&speeds);
        self.set_module_states(states);
    }

    /// Desaturate and dispatch the given module states, in `ModuleId` order.
    pub fn set_module_states(&mut self, mut states: [ModuleState; NUM_MODULES]) {
        self.desaturated = SwerveKinematics::desaturate(&mut states, self.params.max_speed_ms);

        if self.desaturated {
            trace!("Module speeds desaturated to {} m/s", self.params.max_speed_ms);
        }

        self.dispatch(states);
    }

    /// Stop the chassis with the wheels in an X so it resists being pushed.
    pub fn set_x(&mut self) {
        let mut states = [ModuleState::default(); NUM_MODULES];
        for (s, angle_deg) in states.iter_mut().zip(X_STANCE_DEG.iter()) {
            *s = ModuleState::from_degrees(0.0, *angle_deg);
        }

        self.desaturated = false;
        self.dispatch(states);

        debug!("Wheels locked in X stance");
    }

    /// Command zero speed on every module, holding the steering.
    pub fn stop(&mut self) {
        for (m, d) in self.modules.iter_mut().zip(self.desired.iter_mut()) {
            m.stop();
            d.speed_ms = 0.0;
        }

        self.desaturated = false;
    }

    /// Put the drive into a safe state.
    pub fn make_safe(&mut self) {
        self.stop();
        warn!("DriveCtrl made safe, all modules stopped");
    }

    /// Reset the heading sensor to zero. The pose is not changed.
    pub fn zero_heading(&mut self) {
        self.gyro.reset();
        self.gyro_angle.reset_to(0.0);
        self.gyro_yaw.reset_to(0.0);

        let positions = self.module_positions();
        let pose = self.pose_est.pose();
        self.pose_est.reset_position(0.0, &positions, pose);

        info!("Heading zeroed");
    }

    /// Set the pose to the given value.
    pub fn reset_odometry(&mut self, pose: RobotPose) {
        let positions = self.module_positions();
        self.pose_est.reset_position(
            self.gyro_angle.value().to_radians(),
            &positions,
            pose
        );
    }

    /// Zero the drive encoders of all modules. The pose is not changed.
    pub fn reset_encoders(&mut self) {
        for m in self.modules.iter_mut() {
            m.reset_encoders();
        }

        let positions = self.module_positions();
        let pose = self.pose_est.pose();
        self.pose_est.reset_position(
            self.gyro_angle.value().to_radians(),
            &positions,
            pose
        );
    }

    /// Run one control cycle.
    ///
    /// Must be called every cycle whether or not a new command was given, so
    /// that the pose keeps tracking the chassis.
    pub fn periodic(&mut self, dt_s: f64) -> StatusReport {
        self.gyro_angle.update(self.gyro.angle_deg());
        self.gyro_yaw.update(self.gyro.yaw_deg());
        self.gyro_rate.update(self.gyro.rate_degs());

        for m in self.modules.iter_mut() {
            m.update(dt_s);
        }

        let positions = self.module_positions();
        self.pose_est.update(self.gyro_angle.value().to_radians(), &positions);

        if dt_s.is_finite() && dt_s > 0.0 {
            self.time_s += dt_s;
        }

        self.report = self.build_report();
        self.publish_tm();
        self.report.tm_failed = self.tm_failing;

        self.report
    }

    /// Current pose estimate.
    pub fn pose(&self) -> RobotPose {
        self.pose_est.pose()
    }

    /// Heading sensor angle wrapped into (-180, 180].
    ///
    /// Units: degrees
    pub fn heading_deg(&self) -> f64 {
        wrap_pi(self.gyro_angle.value().to_radians()).to_degrees()
    }

    /// Rate of turn, counter-clockwise positive unless `gyro_reversed` is
    /// set.
    ///
    /// Units: degrees/second
    pub fn turn_rate_degs(&self) -> f64 {
        let rate = self.gyro_rate.value();

        if self.params.gyro_reversed { -rate } else { rate }
    }

    /// Measured state of each module.
    pub fn module_states(&self) -> [ModuleState; NUM_MODULES] {
        let mut states = [ModuleState::default(); NUM_MODULES];
        for (s, m) in states.iter_mut().zip(self.modules.iter()) {
            *s = m.state();
        }
        states
    }

    /// Measured position of each module.
    pub fn module_positions(&self) -> [ModulePosition; NUM_MODULES] {
        let mut positions = [ModulePosition::default(); NUM_MODULES];
        for (p, m) in positions.iter_mut().zip(self.modules.iter()) {
            *p = m.position();
        }
        positions
    }

    /// Chassis speeds estimated from the measured module states.
    pub fn measured_chassis_speeds(&self) -> ChassisSpeeds {
        self.kinematics().to_chassis_speeds(&self.module_states())
    }

    /// The states last dispatched to the modules, before optimisation.
    pub fn desired_states(&self) -> [ModuleState; NUM_MODULES] {
        self.desired
    }

    /// Status from the last cycle.
    pub fn report(&self) -> StatusReport {
        self.report
    }

    /// Telemetry frame for the current state of the drive.
    pub fn telemetry(&self) -> DriveTm {
        let pose = self.pose();

        let mut tm = DriveTm {
            time_s: self.time_s,
            gyro_angle_deg: self.gyro_angle.value(),
            gyro_yaw_deg: self.gyro_yaw.value(),
            turn_rate_degs: self.turn_rate_degs(),
            pose_x_m: pose.x_m,
            pose_y_m: pose.y_m,
            pose_heading_rad: pose.heading_rad,
            desaturated: self.desaturated,
            ..Default::default()
        };

        for m in self.modules.iter() {
            tm.set_module(
                m.id(),
                m.steer_relative_rad(),
                m.steer_absolute_rad(),
                m.state().speed_ms
            );
        }

        tm
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        self.pose_est.kinematics()
    }

    pub fn modules(&self) -> &[ModuleCtrl<M>; NUM_MODULES] {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut [ModuleCtrl<M>; NUM_MODULES] {
        &mut self.modules
    }

    pub fn gyro(&self) -> &G {
        &self.gyro
    }

    pub fn gyro_mut(&mut self) -> &mut G {
        &mut self.gyro
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    fn dispatch(&mut self, states: [ModuleState; NUM_MODULES]) {
        for (m, s) in self.modules.iter_mut().zip(states.iter()) {
            m.set_desired_state(*s);
        }

        self.desired = states;
    }

    fn build_report(&self) -> StatusReport {
        let gyro = [&self.gyro_angle, &self.gyro_yaw, &self.gyro_rate];

        let mut report = StatusReport {
            desaturated: self.desaturated,
            heading_faulted: gyro.iter().any(|r| r.is_faulted()),
            consecutive_faults: gyro.iter()
                .map(|r| r.consecutive_faults())
                .max()
                .unwrap_or(0),
            fault_limit_exceeded: gyro.iter().any(|r| r.limit_exceeded()),
            ..Default::default()
        };

        for (faulted, m) in report.module_faulted.iter_mut().zip(self.modules.iter()) {
            let status = m.status();

            *faulted = status.steer_faulted
                || status.drive_pos_faulted
                || status.drive_vel_faulted;
            report.consecutive_faults = report.consecutive_faults.max(status.consecutive_faults);
            report.fault_limit_exceeded |= status.fault_limit_exceeded;
        }

        report
    }

    /// Publish telemetry to the sink, if there is one.
    fn publish_tm(&mut self) {
        if self.tm_sink.is_none() {
            return
        }

        let tm = self.telemetry();

        if let Some(sink) = self.tm_sink.as_mut() {
            match sink.publish(&tm) {
                Ok(()) => {
                    if self.tm_failing {
                        info!("Telemetry sink recovered");
                    }
                    self.tm_failing = false;
                },
                Err(e) => {
                    if !self.tm_failing {
                        warn!("Telemetry sink failed, continuing without telemetry: {}", e);
                    }
                    self.tm_failing = true;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Check an initial heading sensor reading.
fn initial_read(
    sample: Result<f64, crate::sensing::SensorError>
) -> Result<f64, DriveCtrlError> {
    match sample {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(v) => Err(DriveCtrlError::InitialHeading(
            crate::sensing::SensorError::InvalidValue(v)
        )),
        Err(e) => Err(DriveCtrlError::InitialHeading(e))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::drive_ctrl::test_params;
    use crate::module_ctrl::ModuleCtrlError;
    use crate::sim::{sim_drive, step_sim, SimChassis, SimHeading, SimModuleIo};
    use crate::tm::TmError;
    use util::maths::get_ang_dist_2pi;
    use std::{cell::RefCell, f64::consts::FRAC_PI_2, rc::Rc};

    const DT_S: f64 = 0.02;

    fn sim() -> DriveCtrl<SimModuleIo, SimHeading> {
        sim_drive(test_params(), 0.0).unwrap()
    }

    /// Run `cycles` control cycles on the simulated hardware.
    fn run(drive: &mut DriveCtrl<SimModuleIo, SimHeading>, chassis: &mut SimChassis, cycles: usize) {
        for _ in 0..cycles {
            drive.periodic(DT_S);
            step_sim(drive, chassis, DT_S);
        }
    }

    /// Keeps every published frame.
    struct RecordingSink(Rc<RefCell<Vec<DriveTm>>>);

    impl TelemetrySink for RecordingSink {
        fn publish(&mut self, tm: &DriveTm) -> Result<(), TmError> {
            self.0.borrow_mut().push(*tm);
            Ok(())
        }
    }

    #[test]
    fn test_construction() {
        let drive = sim();
        for (m, id) in drive.modules().iter().zip(ModuleId::ALL.iter()) {
            assert_eq!(m.id(), *id);
            assert!(m.io().current_limits().is_some());
            assert!(get_ang_dist_2pi(m.state().angle_rad, 0.0).abs() < 1e-9);
        }
        assert_eq!(drive.pose(), RobotPose::default());
    }

    #[test]
    fn test_swapped_modules() {
        let p = test_params();
        let io = [
            SimModuleIo::new(&p.module_config(ModuleId::FrontRight), 0.0),
            SimModuleIo::new(&p.module_config(ModuleId::FrontLeft), 0.0),
            SimModuleIo::new(&p.module_config(ModuleId::RearLeft), 0.0),
            SimModuleIo::new(&p.module_config(ModuleId::RearRight), 0.0)
        ];

        assert!(matches!(
            DriveCtrl::new(p, io, SimHeading::new(0.0)),
            Err(DriveCtrlError::Module(ModuleCtrlError::DeviceMismatch(ModuleId::FrontLeft, _, _)))
        ));
    }

    #[test]
    fn test_invalid_params() {
        let mut p = test_params();
        p.modules[2].steer_motor_id = p.modules[0].drive_motor_id;
        assert!(matches!(sim_drive(p, 0.0), Err(DriveCtrlError::InvalidParams(_))));
    }

    #[test]
    fn test_heading_unavailable() {
        let p = test_params();
        let io = [
            SimModuleIo::new(&p.module_config(ModuleId::FrontLeft), 0.0),
            SimModuleIo::new(&p.module_config(ModuleId::FrontRight), 0.0),
            SimModuleIo::new(&p.module_config(ModuleId::RearLeft), 0.0),
            SimModuleIo::new(&p.module_config(ModuleId::RearRight), 0.0)
        ];
        let mut gyro = SimHeading::new(0.0);
        gyro.faults = 1;

        assert!(matches!(
            DriveCtrl::new(p, io, gyro),
            Err(DriveCtrlError::InitialHeading(_))
        ));
    }

    #[test]
    fn test_set_x() {
        let mut drive = sim();
        drive.drive(0.3, -0.2, 0.5, false);
        drive.periodic(DT_S);

        drive.set_x();

        let expected = [
            ModuleState::from_degrees(0.0, 45.0),
            ModuleState::from_degrees(0.0, -45.0),
            ModuleState::from_degrees(0.0, -45.0),
            ModuleState::from_degrees(0.0, 45.0)
        ];
        assert_eq!(drive.desired_states(), expected);

        // The module targets may be reversed but point along the same line
        for (m, e) in drive.modules().iter().zip(expected.iter()) {
            let t = m.target().unwrap();
            assert_eq!(t.speed_ms, 0.0);
            let diff = (t.angle_rad - e.angle_rad).rem_euclid(std::f64::consts::PI);
            assert!(diff < 1e-9 || std::f64::consts::PI - diff < 1e-9);
        }
        assert!(!drive.report().desaturated);
    }

    #[test]
    fn test_straight_forward() {
        let mut drive = sim();
        drive.drive(1.0, 0.0, 0.0, false);

        for s in drive.desired_states().iter() {
            assert!((s.speed_ms - drive.params().max_speed_ms).abs() < 1e-9);
            assert_eq!(s.angle_rad, 0.0);
        }
    }

    #[test]
    fn test_pure_rotation() {
        let mut drive = sim();
        drive.drive(0.0, 0.0, 1.0, false);

        let states = drive.desired_states();
        let geom = *drive.kinematics().geometry();

        for (s, g) in states.iter().zip(geom.iter()) {
            assert!((s.speed_ms - states[0].speed_ms).abs() < 1e-9);
            let expected = g.offset_x_m.atan2(-g.offset_y_m);
            assert!((s.angle_rad - expected).abs() < 1e-9);
        }
        assert!((states[0].angle_rad - 135f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn test_field_relative() {
        // Robot faces world +y, world forward is to the robot's right
        let mut drive = sim_drive(test_params(), 90.0).unwrap();
        drive.drive(1.0, 0.0, 0.0, true);

        for s in drive.desired_states().iter() {
            assert!((s.speed_ms - drive.params().max_speed_ms).abs() < 1e-9);
            assert!((s.angle_rad + FRAC_PI_2).abs() < 1e-9);
        }

        // Robot relative ignores the heading
        drive.drive(1.0, 0.0, 0.0, false);
        for s in drive.desired_states().iter() {
            assert!(s.angle_rad.abs() < 1e-12);
        }
    }

    #[test]
    fn test_clamp_and_desaturate() {
        let mut drive = sim();

        // Out of range and NaN inputs
        drive.drive(5.0, f64::NAN, 0.0, false);
        for s in drive.desired_states().iter() {
            assert!((s.speed_ms - drive.params().max_speed_ms).abs() < 1e-9);
            assert_eq!(s.angle_rad, 0.0);
        }

        // Full forward and full rotation cannot both be met
        drive.drive(1.0, 0.0, 1.0, false);
        let max = drive.params().max_speed_ms;
        let states = drive.desired_states();
        assert!(states.iter().all(|s| s.speed_ms.abs() <= max + 1e-9));
        assert!(states.iter().any(|s| (s.speed_ms.abs() - max).abs() < 1e-9));
        assert!(drive.periodic(DT_S).desaturated);

        drive.drive(0.1, 0.0, 0.0, false);
        assert!(!drive.periodic(DT_S).desaturated);
    }

    #[test]
    fn test_zero_request_stops() {
        let mut drive = sim();
        drive.drive(0.0, 0.0, 0.5, false);
        let angles: Vec<f64> = drive.desired_states().iter().map(|s| s.angle_rad).collect();

        drive.drive(0.0, 0.0, 0.0, false);
        for (s, a) in drive.desired_states().iter().zip(angles.iter()) {
            assert_eq!(s.speed_ms, 0.0);
            assert_eq!(s.angle_rad, *a);
        }
        for m in drive.modules().iter() {
            assert_eq!(m.target().unwrap().speed_ms, 0.0);
        }
    }

    #[test]
    fn test_closed_loop_straight() {
        let mut drive = sim();
        let mut chassis = SimChassis::default();

        drive.drive(0.5, 0.0, 0.0, false);
        run(&mut drive, &mut chassis, 100);
        drive.periodic(DT_S);

        let target_ms = 0.5 * drive.params().max_speed_ms;
        for s in drive.module_states().iter() {
            assert!((s.speed_ms - target_ms).abs() < 0.01);
            assert!(get_ang_dist_2pi(s.angle_rad, 0.0).abs() < 1e-6);
        }

        let speeds = drive.measured_chassis_speeds();
        assert!((speeds.vx_ms - target_ms).abs() < 0.01);
        assert!(speeds.vy_ms.abs() < 1e-6);

        // Odometry follows the wheels exactly when driving straight
        let pose = drive.pose();
        let travelled = drive.modules()[0].io().wheel_distance_m();
        assert!((pose.x_m - travelled).abs() < 1e-6);
        assert!((pose.x_m - chassis.pose.x_m).abs() < 1e-6);
        assert!(pose.y_m.abs() < 1e-6);

        // Stopping brings the wheels to rest and the pose stops changing
        drive.stop();
        run(&mut drive, &mut chassis, 100);
        drive.periodic(DT_S);
        let rest = drive.pose();
        drive.periodic(DT_S);
        assert_eq!(drive.pose(), rest);
        for s in drive.module_states().iter() {
            assert!(s.speed_ms.abs() < 1e-3);
        }
    }

    #[test]
    fn test_closed_loop_turning() {
        let mut drive = sim();
        let mut chassis = SimChassis::default();

        // Steer the wheels round before any distance is covered
        drive.drive(0.0, 0.5, 0.0, false);
        run(&mut drive, &mut chassis, 50);
        for s in drive.module_states().iter() {
            let diff = (s.angle_rad - FRAC_PI_2).rem_euclid(std::f64::consts::PI);
            assert!(diff < 1e-3 || std::f64::consts::PI - diff < 1e-3);
        }

        drive.drive(0.5, 0.0, 0.2, false);
        run(&mut drive, &mut chassis, 200);
        drive.periodic(DT_S);

        let pose = drive.pose();
        assert!((pose.x_m - chassis.pose.x_m).abs() < 1e-3);
        assert!((pose.y_m - chassis.pose.y_m).abs() < 1e-3);
        assert!((pose.heading_rad - chassis.pose.heading_rad).abs() < 1e-6);
        assert!(pose.heading_rad > 0.5);
        assert!((drive.turn_rate_degs() - chassis.speeds.omega_rads.to_degrees()).abs() < 1e-6);
    }

    #[test]
    fn test_idle_pose_tracking() {
        let mut drive = sim();
        let start = RobotPose::new(1.0, -2.0, 0.3);
        drive.reset_odometry(start);
        assert_eq!(drive.pose(), start);

        // Nothing commanded, the pose must not move
        for _ in 0..50 {
            drive.periodic(DT_S);
        }
        assert_eq!(drive.pose(), start);
    }

    #[test]
    fn test_zero_heading() {
        let mut drive = sim_drive(test_params(), 30.0).unwrap();
        drive.periodic(DT_S);
        assert!((drive.heading_deg() - 30.0).abs() < 1e-9);

        let pose = RobotPose::new(2.0, 3.0, 0.5);
        drive.reset_odometry(pose);
        drive.zero_heading();

        assert_eq!(drive.heading_deg(), 0.0);
        assert_eq!(drive.pose(), pose);
        drive.periodic(DT_S);
        assert_eq!(drive.pose(), pose);
    }

    #[test]
    fn test_heading_and_turn_rate() {
        let mut drive = sim_drive(test_params(), 200.0).unwrap();
        drive.gyro_mut().step(10f64.to_radians(), 0.0);
        drive.periodic(DT_S);

        assert!((drive.heading_deg() + 160.0).abs() < 1e-9);
        assert!((drive.turn_rate_degs() - 10.0).abs() < 1e-9);

        let mut p = test_params();
        p.gyro_reversed = true;
        let mut drive = sim_drive(p, 0.0).unwrap();
        drive.gyro_mut().step(10f64.to_radians(), 0.0);
        drive.periodic(DT_S);
        assert!((drive.turn_rate_degs() + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_encoders() {
        let mut drive = sim();
        let mut chassis = SimChassis::default();

        drive.drive(0.5, 0.0, 0.0, false);
        run(&mut drive, &mut chassis, 20);
        drive.stop();
        run(&mut drive, &mut chassis, 50);
        drive.periodic(DT_S);

        let pose = drive.pose();
        assert!(pose.x_m > 0.0);

        drive.reset_encoders();
        for p in drive.module_positions().iter() {
            assert_eq!(p.distance_m, 0.0);
        }
        drive.periodic(DT_S);
        assert_eq!(drive.pose(), pose);
    }

    #[test]
    fn test_sensor_faults() {
        let mut drive = sim();
        let limit = drive.params().sensor_fault_limit;

        // Heading lost for longer than the limit
        drive.gyro_mut().faults = limit + 1;
        let mut report = StatusReport::default();
        for _ in 0..=limit {
            report = drive.periodic(DT_S);
        }
        assert!(report.heading_faulted);
        assert!(report.fault_limit_exceeded);
        assert_eq!(report.consecutive_faults, limit + 1);
        assert_eq!(drive.pose(), RobotPose::default());

        let report = drive.periodic(DT_S);
        assert_eq!(report, StatusReport::default());

        // A single module read dropped
        drive.modules_mut()[2].io_mut().faults.steer = 1;
        let report = drive.periodic(DT_S);
        assert_eq!(report.module_faulted, [false, false, true, false]);
        assert!(!report.fault_limit_exceeded);
    }

    #[test]
    fn test_telemetry() {
        let mut drive = sim_drive(test_params(), 45.0).unwrap();
        let frames = Rc::new(RefCell::new(Vec::new()));
        drive.set_tm_sink(Box::new(RecordingSink(frames.clone())));

        drive.periodic(DT_S);
        drive.periodic(DT_S);

        let frames = frames.borrow();
        assert_eq!(frames.len(), 2);
        assert!((frames[1].time_s - 2.0 * DT_S).abs() < 1e-12);
        assert_eq!(frames[1].gyro_angle_deg, 45.0);

        // Front left encoder is inverted and mounted at -72.7 deg
        let (rel, abs) = frames[1].module_steering(ModuleId::FrontLeft);
        assert!(rel.abs() < 1e-9 || (rel - std::f64::consts::TAU).abs() < 1e-9);
        assert!((abs - (-72.7f64).to_radians().rem_euclid(std::f64::consts::TAU)).abs() < 1e-9);
    }

    #[test]
    fn test_failing_sink_does_not_affect_control() {
        let mut with_sink = sim();
        let mut without_sink = sim();
        let mut chassis_a = SimChassis::default();
        let mut chassis_b = SimChassis::default();

        with_sink.set_tm_sink(Box::new(crate::tm::ArchiveSink::from_archiver(
            util::archive::Archiver::default()
        )));

        let cmds = [
            DriveCmd::Drive { vx: 0.4, vy: 0.1, omega: -0.3, field_relative: true },
            DriveCmd::None,
            DriveCmd::LockX,
            DriveCmd::Stop
        ];

        for cmd in cmds.iter() {
            for _ in 0..20 {
                let (out_a, rep_a) = with_sink.proc(&InputData { cmd: *cmd, dt_s: DT_S }).unwrap();
                let (out_b, rep_b) = without_sink.proc(&InputData { cmd: *cmd, dt_s: DT_S }).unwrap();
                step_sim(&mut with_sink, &mut chassis_a, DT_S);
                step_sim(&mut without_sink, &mut chassis_b, DT_S);

                assert_eq!(out_a.module_outputs, out_b.module_outputs);
                assert_eq!(out_a.pose, out_b.pose);
                assert!(rep_a.tm_failed);
                assert!(!rep_b.tm_failed);
            }
        }

        assert!(with_sink.take_tm_sink().is_some());
        assert!(!with_sink.periodic(DT_S).tm_failed);
    }

    #[test]
    fn test_proc_commands() {
        let mut drive = sim();

        let (out, _) = drive.proc(&InputData {
            cmd: DriveCmd::ResetOdometry(RobotPose::new(1.0, 1.0, 0.0)),
            dt_s: DT_S
        }).unwrap();
        assert_eq!(out.pose, RobotPose::new(1.0, 1.0, 0.0));

        let (out, _) = drive.proc(&InputData {
            cmd: DriveCmd::Drive { vx: 1.0, vy: 0.0, omega: 0.0, field_relative: false },
            dt_s: DT_S
        }).unwrap();
        for t in out.module_targets.iter() {
            assert!((t.speed_ms - drive.params().max_speed_ms).abs() < 1e-9);
        }
        assert!(out.module_outputs.iter().all(|o| o.drive_demand > 0.0));

        let (out, _) = drive.proc(&InputData { cmd: DriveCmd::Stop, dt_s: DT_S }).unwrap();
        assert!(out.module_targets.iter().all(|t| t.speed_ms == 0.0));
    }
}
