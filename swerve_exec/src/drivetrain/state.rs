//! Implementation of the drivetrain coordinator

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, trace, warn};
use serde::Serialize;

// Internal
use super::{
    Desaturation, DriveOp, DriveReport, DrivetrainError, Params, StalePolicy,
};
use crate::{
    fault::FaultKind,
    geom::{Pose2d, Rotation},
    hal::{HalError, HeadingSensor, ModuleHardware},
    kinematics::{
        desaturate_wheel_speeds, desaturate_with_limits, ChassisSpeeds, KinematicsError,
        ModulePosition, ModuleSlot, ModuleState, SwerveKinematics, NUM_MODULES,
    },
    module_ctrl::ModuleCtrl,
    odometry::{Odometry, PoseHandle},
};
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The swerve drivetrain.
pub struct Drivetrain {
    params: Params,
    kinematics: SwerveKinematics,

    /// Module controllers in `ModuleSlot::ALL` order.
    modules: Vec<ModuleCtrl>,
    gyro: Box<dyn HeadingSensor>,
    odometry: Odometry,

    /// The last heading successfully read from the gyro.
    last_heading: Rotation,

    stale: [bool; NUM_MODULES],
}

/// Input to one cycle of drivetrain processing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputData {
    /// The demanded chassis speeds.
    pub speeds: ChassisSpeeds,

    /// True if `speeds` are field-relative, false if robot-relative.
    pub field_relative: bool,

    /// The control period.
    ///
    /// Units: seconds
    pub period_s: f64,
}

/// Output of one cycle of drivetrain processing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OutputData {
    /// The pose estimate after this cycle.
    pub pose: Pose2d,

    /// The states commanded to the modules.
    pub commanded: [ModuleState; NUM_MODULES],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Drivetrain {
    /// Build the drivetrain.
    ///
    /// The initial gyro heading and module positions must be readable, they
    /// seed the odometry at the origin.
    pub fn new(
        params: Params,
        hardware: [ModuleHardware; NUM_MODULES],
        mut gyro: Box<dyn HeadingSensor>,
    ) -> Result<Self, DrivetrainError> {
        params.validate()?;

        let kinematics = SwerveKinematics::new(params.offsets())?;

        let mut modules = Vec::with_capacity(NUM_MODULES);
        for (slot, hw) in ModuleSlot::ALL.iter().zip(Vec::from(hardware)) {
            let m = ModuleCtrl::new(*slot, params.module, hw)
                .map_err(|source| DrivetrainError::Module { slot: *slot, source })?;
            modules.push(m);
        }

        let heading = read_heading(gyro.as_mut()).map_err(DrivetrainError::Gyro)?;

        let mut positions = [ModulePosition::default(); NUM_MODULES];
        for (p, m) in positions.iter_mut().zip(modules.iter_mut()) {
            let slot = m.slot();
            *p = m
                .position()
                .map_err(|source| DrivetrainError::Module { slot, source })?;
        }

        let odometry = Odometry::new(kinematics.clone(), heading, positions, Pose2d::default());

        info!(
            "Drivetrain initialised, max speed {} m/s, max rate {} rad/s, max module speed {} m/s",
            params.max_chassis_speed_ms, params.max_chassis_rate_rads, params.max_module_speed_ms
        );

        Ok(Self {
            params,
            kinematics,
            modules,
            gyro,
            odometry,
            last_heading: heading,
            stale: [false; NUM_MODULES],
        })
    }

    /// Drive the robot at the given chassis speeds.
    ///
    /// Field-relative speeds are converted to robot-relative using the gyro,
    /// falling back on the last known heading if the gyro can't be read.
    /// Speeds are then discretised over `period_s`, converted into module
    /// states, desaturated and sent to the modules.
    ///
    /// Non-finite speeds or an invalid period stop the modules instead.
    pub fn drive(
        &mut self,
        vx_ms: f64,
        vy_ms: f64,
        omega_rads: f64,
        field_relative: bool,
        period_s: f64,
    ) -> DriveReport {
        let mut report = DriveReport::default();
        report.stale = self.stale;

        let requested = ChassisSpeeds::new(vx_ms, vy_ms, omega_rads);
        if !requested.is_finite() {
            report.push(None, DriveOp::Kinematics, KinematicsError::NonFiniteInput.into());
            self.stop_all(&mut report);
            return self.finish(report);
        }

        let speeds = if field_relative {
            let heading = self.heading_or_fallback(&mut report);
            ChassisSpeeds::from_field_relative(requested, heading)
        } else {
            requested
        };

        let states = match self.calc_module_states(speeds, period_s) {
            Ok((states, factor)) => {
                report.desaturation_factor = factor;
                states
            }
            Err(e) => {
                report.push(None, DriveOp::Kinematics, e.into());
                self.stop_all(&mut report);
                return self.finish(report);
            }
        };

        for (i, (module, target)) in self.modules.iter_mut().zip(states.iter()).enumerate() {
            let slot = module.slot();

            match module.set_desired_state(*target) {
                Ok(cmd) => {
                    report.commanded[i] = cmd;
                    self.stale[i] = false;
                }
                Err(source) => {
                    let sensor = source.kind() == FaultKind::Sensor;
                    report.push(
                        Some(slot),
                        DriveOp::SetState,
                        DrivetrainError::Module { slot, source },
                    );

                    if sensor {
                        self.stale[i] = true;

                        if self.params.stale_policy == StalePolicy::ZeroDrive {
                            if let Err(source) = module.stop() {
                                report.push(
                                    Some(slot),
                                    DriveOp::Stop,
                                    DrivetrainError::Module { slot, source },
                                );
                            }
                        } else {
                            report.commanded[i] = module.last_command();
                        }
                    }
                }
            }
        }

        trace!("Drivetrain commanded {:?}", report.commanded);

        self.finish(report)
    }

    /// Integrate the latest module positions and gyro heading into the pose.
    ///
    /// If the gyro or any module can't be read the update is skipped; the
    /// previous snapshot is kept so the motion is picked up on the next good
    /// update.
    pub fn update_odometry(&mut self) -> DriveReport {
        let mut report = DriveReport::default();

        let heading = match read_heading(self.gyro.as_mut()) {
            Ok(h) => {
                self.last_heading = h;
                Some(h)
            }
            Err(e) => {
                report.push(None, DriveOp::ReadHeading, DrivetrainError::Gyro(e));
                None
            }
        };

        let positions = self.read_positions(&mut report);

        if let (Some(h), Some(p)) = (heading, positions) {
            self.odometry.update(h, &p);
        }

        self.finish(report)
    }

    /// The current pose estimate.
    pub fn pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    /// A handle other threads can read the pose through.
    pub fn pose_handle(&self) -> PoseHandle {
        self.odometry.handle()
    }

    /// Overwrite the pose estimate.
    pub fn reset_pose(&mut self, pose: Pose2d) -> Result<(), DrivetrainError> {
        let heading = read_heading(self.gyro.as_mut()).map_err(DrivetrainError::Gyro)?;
        self.last_heading = heading;

        let mut positions = [ModulePosition::default(); NUM_MODULES];
        for (p, m) in positions.iter_mut().zip(self.modules.iter_mut()) {
            let slot = m.slot();
            *p = m
                .position()
                .map_err(|source| DrivetrainError::Module { slot, source })?;
        }

        self.odometry.reset_position(heading, &positions, pose);

        info!("Pose reset to {}", pose);
        Ok(())
    }

    /// The robot-relative chassis speeds measured from the modules.
    pub fn robot_relative_speeds(&mut self) -> Result<ChassisSpeeds, DrivetrainError> {
        let mut states = [ModuleState::default(); NUM_MODULES];
        for (s, m) in states.iter_mut().zip(self.modules.iter_mut()) {
            let slot = m.slot();
            *s = m
                .state()
                .map_err(|source| DrivetrainError::Module { slot, source })?;
        }

        Ok(self.kinematics.to_chassis_speeds(&states))
    }

    /// The field-relative chassis speeds measured from the modules and gyro.
    pub fn field_relative_speeds(&mut self) -> Result<ChassisSpeeds, DrivetrainError> {
        let robot = self.robot_relative_speeds()?;
        let heading = read_heading(self.gyro.as_mut()).map_err(DrivetrainError::Gyro)?;

        Ok(ChassisSpeeds::to_field_relative(robot, heading))
    }

    /// Make the robot's current heading the field-relative forward
    /// direction. The pose estimate is not changed.
    pub fn zero_heading(&mut self) -> Result<(), DrivetrainError> {
        let before = read_heading(self.gyro.as_mut()).map_err(DrivetrainError::Gyro)?;
        self.gyro.zero().map_err(DrivetrainError::Gyro)?;
        self.last_heading = Rotation::default();
        self.odometry.rebase_gyro(before, self.last_heading);

        info!("Heading zeroed");
        Ok(())
    }

    /// Stop all drive outputs.
    pub fn make_safe(&mut self) -> DriveReport {
        let mut report = DriveReport::default();
        report.stale = self.stale;
        self.stop_all(&mut report);
        self.finish(report)
    }

    /// Modules whose sensors faulted on their most recent access.
    pub fn stale(&self) -> [bool; NUM_MODULES] {
        self.stale
    }

    /// The drivetrain parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    fn calc_module_states(
        &self,
        speeds: ChassisSpeeds,
        period_s: f64,
    ) -> Result<([ModuleState; NUM_MODULES], f64), KinematicsError> {
        let speeds = if self.params.discretize {
            ChassisSpeeds::discretize(speeds, period_s)?
        } else {
            speeds
        };

        let mut states = self.kinematics.to_module_states(speeds);

        let factor = match self.params.desaturation {
            Desaturation::ModuleLimit => {
                desaturate_wheel_speeds(&mut states, self.params.max_module_speed_ms)?
            }
            Desaturation::ChassisLimits => desaturate_with_limits(
                &mut states,
                speeds,
                self.params.max_module_speed_ms,
                self.params.max_chassis_speed_ms,
                self.params.max_chassis_rate_rads,
            )?,
        };

        Ok((states, factor))
    }

    fn heading_or_fallback(&mut self, report: &mut DriveReport) -> Rotation {
        match read_heading(self.gyro.as_mut()) {
            Ok(h) => {
                self.last_heading = h;
                h
            }
            Err(e) => {
                report.push(None, DriveOp::ReadHeading, DrivetrainError::Gyro(e));
                report.heading_fallback = true;
                self.last_heading
            }
        }
    }

    fn read_positions(&mut self, report: &mut DriveReport) -> Option<[ModulePosition; NUM_MODULES]> {
        let mut positions = [ModulePosition::default(); NUM_MODULES];
        let mut ok = true;

        for (i, (p, m)) in positions.iter_mut().zip(self.modules.iter_mut()).enumerate() {
            let slot = m.slot();
            match m.position() {
                Ok(pos) => {
                    *p = pos;
                    self.stale[i] = false;
                }
                Err(source) => {
                    if source.kind() == FaultKind::Sensor {
                        self.stale[i] = true;
                    }
                    report.push(
                        Some(slot),
                        DriveOp::ReadPosition,
                        DrivetrainError::Module { slot, source },
                    );
                    ok = false;
                }
            }
        }

        if ok {
            Some(positions)
        } else {
            None
        }
    }

    fn stop_all(&mut self, report: &mut DriveReport) {
        for m in self.modules.iter_mut() {
            let slot = m.slot();
            if let Err(source) = m.stop() {
                report.push(
                    Some(slot),
                    DriveOp::Stop,
                    DrivetrainError::Module { slot, source },
                );
            }
        }
    }

    /// Log the faults and attach the current stale flags.
    fn finish(&self, mut report: DriveReport) -> DriveReport {
        for f in report.faults.iter() {
            warn!("Drivetrain fault: {}", f);
        }
        report.stale = self.stale;
        report
    }
}

impl State for Drivetrain {
    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = DriveReport;
    type ProcError = DrivetrainError;

    /// Drive at the demanded speeds then update the odometry.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        if !(input_data.period_s.is_finite() && input_data.period_s > 0.0) {
            return Err(KinematicsError::InvalidPeriod(input_data.period_s).into());
        }

        let s = input_data.speeds;
        let mut report = self.drive(
            s.vx_ms,
            s.vy_ms,
            s.omega_rads,
            input_data.field_relative,
            input_data.period_s,
        );
        report.merge(self.update_odometry());

        let output = OutputData {
            pose: self.pose(),
            commanded: report.commanded,
        };

        Ok((output, report))
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Read the gyro heading, rejecting NaN.
fn read_heading(gyro: &mut dyn HeadingSensor) -> Result<Rotation, HalError> {
    let heading = gyro.heading()?;
    if heading.is_finite() {
        Ok(heading)
    } else {
        Err(HalError::InvalidReading(heading.rad()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::drivetrain::params::test::params;
    use crate::hal::sim::{all_module_hardware, heading_sensor, SharedWorld, SimDevice, SimWorld};
    use std::f64::consts::FRAC_PI_2;

    const EPS: f64 = 1e-9;
    const PERIOD_S: f64 = 0.02;

    fn setup_with(params: Params) -> (SharedWorld, Drivetrain) {
        let world = SimWorld::new(params.offsets(), params.module, 0.0)
            .unwrap()
            .into_shared();
        let dt = Drivetrain::new(params, all_module_hardware(&world), heading_sensor(&world)).unwrap();
        (world, dt)
    }

    fn setup() -> (SharedWorld, Drivetrain) {
        setup_with(params())
    }

    #[test]
    fn test_straight_drive() {
        let (world, mut dt) = setup();

        let report = dt.drive(1.0, 0.0, 0.0, false, PERIOD_S);

        assert!(report.is_ok());
        for (slot, cmd) in ModuleSlot::ALL.iter().zip(report.commanded.iter()) {
            assert!((cmd.speed_ms - 1.0).abs() < EPS);
            assert!(cmd.angle.deg().abs() < EPS);
            assert!((world.borrow().drive_target_ms(*slot) - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn test_pure_rotation_steers_perpendicular() {
        let mut p = params();
        p.discretize = false;
        let (world, mut dt) = setup_with(p);

        dt.drive(0.0, 0.0, 1.0, false, PERIOD_S);

        for (slot, offset) in ModuleSlot::ALL.iter().zip(dt.params().offsets().iter()) {
            let target = world.borrow().steer_target(*slot);
            let dir = nalgebra::Vector2::new(target.cos(), target.sin());
            assert!(dir.dot(offset).abs() < EPS);
        }
    }

    #[test]
    fn test_desaturation_applied() {
        let (_world, mut dt) = setup();

        let report = dt.drive(8.0, 0.0, 0.0, false, PERIOD_S);

        assert!((report.desaturation_factor - 0.5).abs() < EPS);
        for cmd in report.commanded.iter() {
            assert!((cmd.speed_ms - 4.0).abs() < EPS);
        }
    }

    #[test]
    fn test_chassis_limit_desaturation() {
        let mut p = params();
        p.desaturation = Desaturation::ChassisLimits;
        p.max_chassis_speed_ms = 8.0;
        p.max_chassis_rate_rads = 20.0;
        let (world, mut dt) = setup_with(p);

        // Half the max rate, so the fastest module runs at half its max
        let report = dt.drive(0.0, 0.0, 10.0, false, PERIOD_S);
        let radius_m = 0.3 * 2.0f64.sqrt();

        assert!(report.is_ok());
        assert!((report.desaturation_factor - 2.0 / (10.0 * radius_m)).abs() < EPS);
        for (slot, cmd) in ModuleSlot::ALL.iter().zip(report.commanded.iter()) {
            assert!((cmd.speed_ms.abs() - 2.0).abs() < EPS);
            assert!((world.borrow().drive_target_ms(*slot).abs() - 2.0).abs() < EPS);
        }

        // A quarter of the max speed
        let report = dt.drive(2.0, 0.0, 0.0, false, PERIOD_S);
        assert!((report.desaturation_factor - 0.5).abs() < EPS);
        for cmd in report.commanded.iter() {
            assert!((cmd.speed_ms.abs() - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn test_field_relative_uses_gyro() {
        let (world, mut dt) = setup();

        // Spin the robot roughly a quarter turn anticlockwise
        for _ in 0..50 {
            dt.drive(0.0, 0.0, FRAC_PI_2, false, PERIOD_S);
            world.borrow_mut().step(PERIOD_S);
        }
        let heading = world.borrow().true_pose().heading;
        assert!(heading.deg() > 45.0);

        // Field +X is now robot right-ish, so the modules point that way
        let report = dt.drive(1.0, 0.0, 0.0, true, PERIOD_S);
        assert!(report.is_ok());

        let expected = -heading;
        for cmd in report.commanded.iter() {
            let err = (cmd.angle - expected).rad().abs();
            let flipped = (cmd.angle - expected - crate::geom::Rotation::from_deg(180.0))
                .rad()
                .abs();
            assert!(err < 1e-6 || flipped < 1e-6);
        }
    }

    #[test]
    fn test_gyro_fault_falls_back_and_skips_odometry() {
        let (world, mut dt) = setup();

        dt.drive(1.0, 0.0, 0.0, false, PERIOD_S);
        world.borrow_mut().step(PERIOD_S);
        world
            .borrow_mut()
            .set_fault(SimDevice::Gyro, Some(HalError::Timeout));

        let report = dt.drive(1.0, 0.0, 0.0, true, PERIOD_S);
        assert!(report.heading_fallback);
        assert!(report.gyro_faulted());
        assert!((report.commanded[0].speed_ms - 1.0).abs() < EPS);

        let report = dt.update_odometry();
        assert!(report.gyro_faulted());
        assert_eq!(dt.pose().position_m.x, 0.0);

        // Nothing is lost once the gyro is back
        world.borrow_mut().clear_faults();
        assert!(dt.update_odometry().is_ok());
        assert!((dt.pose().position_m.x - 0.02).abs() < EPS);
    }

    #[test]
    fn test_nan_gyro_reading_is_a_gyro_fault() {
        let (world, mut dt) = setup();

        dt.drive(1.0, 0.0, 0.0, false, PERIOD_S);
        world.borrow_mut().step(PERIOD_S);
        world.borrow_mut().set_garbled(SimDevice::Gyro, true);

        let report = dt.drive(1.0, 0.0, 0.0, true, PERIOD_S);
        assert!(report.heading_fallback);
        assert!(report.gyro_faulted());
        assert!(report.commanded.iter().all(|c| c.is_finite()));
        assert!((report.commanded[0].speed_ms - 1.0).abs() < EPS);

        let report = dt.update_odometry();
        assert!(report.gyro_faulted());
        assert!(dt.pose().heading.is_finite());
        assert_eq!(dt.pose().position_m.x, 0.0);

        world.borrow_mut().set_garbled(SimDevice::Gyro, false);
        assert!(dt.update_odometry().is_ok());
        assert!((dt.pose().position_m.x - 0.02).abs() < EPS);
        assert!(dt.pose().heading.rad().abs() < EPS);
    }

    #[test]
    fn test_nan_encoder_reading_marks_module_stale() {
        let (world, mut dt) = setup();

        dt.drive(1.0, 0.0, 0.0, false, PERIOD_S);
        world
            .borrow_mut()
            .set_garbled(SimDevice::Encoder(ModuleSlot::RearLeft), true);

        let report = dt.drive(1.0, 0.0, 0.0, false, PERIOD_S);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].module, Some(ModuleSlot::RearLeft));
        assert_eq!(report.faults[0].error.kind(), FaultKind::Sensor);
        assert_eq!(report.stale, [false, false, true, false]);
        assert_eq!(world.borrow().drive_target_ms(ModuleSlot::RearLeft), 0.0);

        let before = dt.pose();
        world.borrow_mut().step(PERIOD_S);
        let report = dt.update_odometry();
        assert!(!report.is_ok());
        assert_eq!(dt.pose(), before);
        assert!(dt.pose().position_m.x.is_finite());

        world.borrow_mut().clear_faults();
        assert!(dt.update_odometry().is_ok());
        assert_eq!(dt.stale(), [false; NUM_MODULES]);
    }

    #[test]
    fn test_stale_module_zero_drive() {
        let (world, mut dt) = setup();

        dt.drive(1.0, 0.0, 0.0, false, PERIOD_S);
        world
            .borrow_mut()
            .set_fault(SimDevice::Encoder(ModuleSlot::RearRight), Some(HalError::Timeout));

        let report = dt.drive(1.0, 0.0, 0.0, false, PERIOD_S);

        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].module, Some(ModuleSlot::RearRight));
        assert_eq!(report.faults[0].op, DriveOp::SetState);
        assert_eq!(report.faults[0].error.kind(), FaultKind::Sensor);
        assert_eq!(report.stale, [false, false, false, true]);

        let w = world.borrow();
        assert_eq!(w.drive_target_ms(ModuleSlot::RearRight), 0.0);
        assert!((w.drive_target_ms(ModuleSlot::FrontLeft) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_stale_module_continue() {
        let mut p = params();
        p.stale_policy = StalePolicy::Continue;
        let (world, mut dt) = setup_with(p);

        dt.drive(1.0, 0.0, 0.0, false, PERIOD_S);
        world
            .borrow_mut()
            .set_fault(SimDevice::Encoder(ModuleSlot::FrontRight), Some(HalError::Timeout));

        let report = dt.drive(2.0, 0.0, 0.0, false, PERIOD_S);

        assert!(report.stale[1]);
        assert!((world.borrow().drive_target_ms(ModuleSlot::FrontRight) - 1.0).abs() < EPS);
        assert!((report.commanded[1].speed_ms - 1.0).abs() < EPS);
    }

    #[test]
    fn test_nan_input_stops() {
        let (world, mut dt) = setup();

        dt.drive(1.0, 0.0, 0.0, false, PERIOD_S);
        let report = dt.drive(f64::NAN, 0.0, 0.0, false, PERIOD_S);

        assert_eq!(report.faults[0].error.kind(), FaultKind::NumericDegenerate);
        for slot in ModuleSlot::ALL.iter() {
            assert_eq!(world.borrow().drive_target_ms(*slot), 0.0);
        }
    }

    #[test]
    fn test_odometry_tracks_sim() {
        let (world, mut dt) = setup();

        for _ in 0..100 {
            dt.drive(1.0, 0.5, 0.8, true, PERIOD_S);
            world.borrow_mut().step(PERIOD_S);
            assert!(dt.update_odometry().is_ok());
        }

        let truth = world.borrow().true_pose();
        let est = dt.pose();
        assert!((truth.position_m - est.position_m).norm() < 1e-6);
        assert!((truth.heading - est.heading).rad().abs() < 1e-9);

        let measured = dt.robot_relative_speeds().unwrap();
        let true_speeds = world.borrow().true_speeds();
        assert!((measured.omega_rads - true_speeds.omega_rads).abs() < 1e-9);
    }

    #[test]
    fn test_reset_and_zero_heading() {
        let (world, mut dt) = setup();

        dt.reset_pose(Pose2d::new(2.0, 3.0, Rotation::from_deg(90.0)))
            .unwrap();
        assert!(dt.update_odometry().is_ok());
        assert!((dt.pose().position_m.x - 2.0).abs() < EPS);
        assert!((dt.pose().heading.deg() - 90.0).abs() < EPS);

        dt.zero_heading().unwrap();
        assert!(dt.update_odometry().is_ok());
        assert!((dt.pose().heading.deg() - 90.0).abs() < EPS);

        world
            .borrow_mut()
            .set_fault(SimDevice::Gyro, Some(HalError::Disconnected));
        assert_eq!(
            dt.zero_heading(),
            Err(DrivetrainError::Gyro(HalError::Disconnected))
        );
    }

    #[test]
    fn test_zero_heading_keeps_unrecorded_rotation() {
        let (world, mut dt) = setup();

        // Turn without updating the odometry
        for _ in 0..10 {
            dt.drive(0.0, 0.0, 1.0, false, PERIOD_S);
            world.borrow_mut().step(PERIOD_S);
        }
        let truth = world.borrow().true_pose().heading;
        assert!(truth.rad() > 0.1);

        dt.zero_heading().unwrap();
        assert!(dt.update_odometry().is_ok());

        assert!((dt.pose().heading - truth).rad().abs() < 1e-9);
    }

    #[test]
    fn test_make_safe() {
        let (world, mut dt) = setup();

        dt.drive(1.0, 1.0, 0.0, false, PERIOD_S);
        assert!(dt.make_safe().is_ok());

        for slot in ModuleSlot::ALL.iter() {
            assert_eq!(world.borrow().drive_target_ms(*slot), 0.0);
        }
    }

    #[test]
    fn test_proc() {
        let (_world, mut dt) = setup();

        let (out, report) = dt
            .proc(&InputData {
                speeds: ChassisSpeeds::new(1.0, 0.0, 0.0),
                field_relative: false,
                period_s: PERIOD_S,
            })
            .unwrap();

        assert!(report.is_ok());
        assert!((out.commanded[2].speed_ms - 1.0).abs() < EPS);

        assert!(dt.proc(&InputData::default()).is_err());
    }

    #[test]
    fn test_bad_geometry_rejected() {
        let mut p = params();
        p.module_offsets_m_rb = [[0.1, 0.1]; NUM_MODULES];
        let world = SimWorld::new(params().offsets(), p.module, 0.0)
            .unwrap()
            .into_shared();

        let err = Drivetrain::new(p, all_module_hardware(&world), heading_sensor(&world))
            .err()
            .unwrap();
        assert_eq!(err.kind(), FaultKind::Configuration);
    }
}
