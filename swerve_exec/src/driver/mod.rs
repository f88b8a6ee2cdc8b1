//! # Control loop driver
//!
//! The `ControlLoop` is called once per fixed period. Each tick it applies
//! any script commands that have become due, works out the chassis demand
//! for the current robot mode, drives the drivetrain (which also updates the
//! odometry) and monitors the result for faults that require safe mode.
//!
//! The loop timing itself (sleeping to the next period, overrun warnings)
//! belongs to the executable, so the loop can be stepped directly in tests.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod script;
pub mod teleop;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

// Internal
use crate::drivetrain::{self, DriveReport, Drivetrain};
use crate::geom::Pose2d;
use crate::kinematics::ChassisSpeeds;
use script::{DriveCmd, DriveScript, PendingCmds};
use teleop::{Action, StickInput, Teleop};
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the control loop.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Params {
    /// Target period of one tick.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Number of consecutive ticks with a gyro fault before safe mode is
    /// entered.
    pub max_consec_gyro_faults: u64,
}

/// The control loop.
pub struct ControlLoop {
    params: Params,
    drivetrain: Drivetrain,
    teleop: Teleop,
    script: Option<DriveScript>,

    mode: RobotMode,
    demand: Demand,

    safe: bool,
    safe_cause: Option<SafeModeCause>,

    num_cycles: u64,
    num_consec_gyro_faults: u64,
}

/// The result of one tick.
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub mode: RobotMode,
    pub safe: bool,

    /// Pose estimate at the end of the tick.
    pub pose: Pose2d,

    /// Chassis speeds measured from the modules, robot-relative.
    pub measured: Option<ChassisSpeeds>,

    pub report: DriveReport,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The robot's operating mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotMode {
    Disabled,
    Autonomous,
    Teleop,
}

/// Gives the reason the robot has been put into safe mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SafeModeCause {
    GyroFaults,
    AllModulesStale,
}

/// Errors raised validating the driver parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    #[error("Invalid parameter {name} = {value}")]
    InvalidParam { name: &'static str, value: f64 },
}

/// The most recent drive demand.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Demand {
    None,
    Speeds {
        speeds: ChassisSpeeds,
        field_relative: bool,
    },
    Stick(StickInput),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the loop timing and fault limits are usable.
    pub fn validate(&self) -> Result<(), ParamsError> {
        positive("cycle_period_s", self.cycle_period_s)?;

        if self.max_consec_gyro_faults == 0 {
            return Err(ParamsError::InvalidParam {
                name: "max_consec_gyro_faults",
                value: 0.0,
            });
        }

        Ok(())
    }
}

impl ControlLoop {
    /// Create the control loop, starting disabled.
    pub fn new(
        params: Params,
        drivetrain: Drivetrain,
        teleop: Teleop,
        script: Option<DriveScript>,
    ) -> Self {
        Self {
            params,
            drivetrain,
            teleop,
            script,
            mode: RobotMode::Disabled,
            demand: Demand::None,
            safe: false,
            safe_cause: None,
            num_cycles: 0,
            num_consec_gyro_faults: 0,
        }
    }

    /// Run one tick at `time_s` seconds from the start of the run.
    pub fn tick(&mut self, time_s: f64) -> TickOutput {
        // ---- SCRIPT ----

        let cmds = match self.script.as_mut().map(|s| s.pending(time_s)) {
            Some(PendingCmds::Some(c)) => c,
            Some(PendingCmds::EndOfScript) => {
                info!("End of script reached");
                self.script = None;
                self.set_mode(RobotMode::Disabled);
                Vec::new()
            }
            _ => Vec::new(),
        };

        for cmd in cmds {
            self.handle_cmd(cmd);
        }

        // ---- DRIVE ----

        let period_s = self.params.cycle_period_s;
        let input = match (self.mode, self.demand) {
            (RobotMode::Disabled, _) | (_, Demand::None) => None,
            (_, Demand::Speeds { speeds, field_relative }) => Some(drivetrain::InputData {
                speeds,
                field_relative,
                period_s,
            }),
            (RobotMode::Teleop, Demand::Stick(stick)) => {
                let p = self.drivetrain.params();
                let (max_speed, max_rate) = (p.max_chassis_speed_ms, p.max_chassis_rate_rads);
                Some(drivetrain::InputData {
                    speeds: self.teleop.shape(stick, period_s, max_speed, max_rate),
                    field_relative: self.teleop.field_relative(),
                    period_s,
                })
            }
            (RobotMode::Autonomous, Demand::Stick(_)) => None,
        };

        let report = match input {
            Some(i) if !self.safe => match self.drivetrain.proc(&i) {
                Ok((_, report)) => report,
                Err(e) => {
                    warn!("Drivetrain processing error: {}", e);
                    self.idle()
                }
            },
            _ => self.idle(),
        };

        // ---- SAFE MODE MONITORING ----

        if report.gyro_faulted() {
            self.num_consec_gyro_faults += 1;
        } else {
            self.num_consec_gyro_faults = 0;
        }

        let gyro_tripped = self.num_consec_gyro_faults >= self.params.max_consec_gyro_faults;
        let all_stale = report.all_stale();

        if gyro_tripped {
            if !self.safe {
                error!(
                    "Gyro faulted on {} consecutive ticks",
                    self.num_consec_gyro_faults
                );
            }
            self.make_safe(SafeModeCause::GyroFaults);
        }
        if all_stale {
            self.make_safe(SafeModeCause::AllModulesStale);
        }

        // Only leave safe mode once every cause has cleared
        if !gyro_tripped && !all_stale {
            if let Some(cause) = self.safe_cause {
                self.make_unsafe(cause).ok();
            }
        }

        self.num_cycles += 1;

        let measured = self.drivetrain.robot_relative_speeds().ok();

        TickOutput {
            mode: self.mode,
            safe: self.safe,
            pose: self.drivetrain.pose(),
            measured,
            report,
        }
    }

    /// Change the robot mode, running the exit and enter hooks.
    pub fn set_mode(&mut self, mode: RobotMode) {
        if mode == self.mode {
            return;
        }

        info!("Exiting {} mode", self.mode);
        self.demand = Demand::None;

        info!("Entering {} mode", mode);
        self.mode = mode;

        match mode {
            RobotMode::Disabled => {
                self.drivetrain.make_safe();
            }
            RobotMode::Autonomous => {
                if let Some(pose) = self.script.as_ref().and_then(|s| s.start_pose()) {
                    if let Err(e) = self.drivetrain.reset_pose(pose) {
                        warn!("Could not reset to the start pose: {}", e);
                    }
                }
            }
            RobotMode::Teleop => self.teleop.reset(),
        }
    }

    /// Put the robot into safe mode with the given cause.
    pub fn make_safe(&mut self, cause: SafeModeCause) {
        if !self.safe {
            warn!("Make safe requested, cause: {:?}", cause);
            self.safe = true;
            self.safe_cause = Some(cause);

            self.drivetrain.make_safe();
        }
    }

    /// Attempts to leave safe mode by clearing the given cause.
    ///
    /// Safe mode is only left if `cause` is the reason it was entered.
    /// Returns `Ok(())` if safe mode is now off.
    pub fn make_unsafe(&mut self, cause: SafeModeCause) -> Result<(), ()> {
        match self.safe_cause {
            None => Ok(()),
            Some(root_cause) if root_cause == cause => {
                self.safe = false;
                self.safe_cause = None;
                info!("Safe mode cause {:?} cleared, safe mode disabled", cause);
                Ok(())
            }
            Some(_) => Err(()),
        }
    }

    pub fn mode(&self) -> RobotMode {
        self.mode
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    /// Number of ticks run.
    pub fn num_cycles(&self) -> u64 {
        self.num_cycles
    }

    /// True once a script has been given and has finished.
    pub fn script_done(&self) -> bool {
        self.script.is_none()
    }

    pub fn drivetrain(&self) -> &Drivetrain {
        &self.drivetrain
    }

    fn handle_cmd(&mut self, cmd: DriveCmd) {
        match cmd {
            DriveCmd::Drive {
                vx_ms,
                vy_ms,
                omega_rads,
                field_relative,
            } => {
                self.demand = Demand::Speeds {
                    speeds: ChassisSpeeds::new(vx_ms, vy_ms, omega_rads),
                    field_relative,
                }
            }
            DriveCmd::Stick(stick) => self.demand = Demand::Stick(stick),
            DriveCmd::Button { button } => {
                if let Some(action) = self.teleop.press(button) {
                    self.handle_action(action);
                }
            }
            DriveCmd::Mode { mode } => self.set_mode(mode),
            DriveCmd::ResetPose { .. } => {
                if let Some(pose) = cmd.pose() {
                    if let Err(e) = self.drivetrain.reset_pose(pose) {
                        warn!("Could not reset the pose: {}", e);
                    }
                }
            }
            DriveCmd::Stop => self.demand = Demand::None,
        }
    }

    fn handle_action(&mut self, action: Action) {
        let res = match action {
            Action::ZeroHeading => self.drivetrain.zero_heading(),
            Action::ResetPose => self.drivetrain.reset_pose(Pose2d::default()),
            Action::SlowMode | Action::ResetSpeed => Ok(()),
        };

        if let Err(e) = res {
            warn!("Could not carry out {:?}: {}", action, e);
        }
    }

    /// Keep the drive outputs stopped and the odometry running.
    fn idle(&mut self) -> DriveReport {
        let mut report = self.drivetrain.make_safe();
        report.merge(self.drivetrain.update_odometry());
        report
    }
}

impl fmt::Display for RobotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RobotMode::Disabled => "disabled",
            RobotMode::Autonomous => "autonomous",
            RobotMode::Teleop => "teleop",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn positive(name: &'static str, value: f64) -> Result<(), ParamsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParamsError::InvalidParam { name, value })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::drivetrain::params::test::params as dt_params;
    use crate::driver::teleop::test::params as teleop_params;
    use crate::hal::{
        sim::{all_module_hardware, heading_sensor, SharedWorld, SimDevice, SimWorld},
        HalError,
    };
    use crate::kinematics::ModuleSlot;

    const PERIOD_S: f64 = 0.02;

    fn setup(script: Option<&str>) -> (SharedWorld, ControlLoop) {
        let p = dt_params();
        let world = SimWorld::new(p.offsets(), p.module, 0.0)
            .unwrap()
            .into_shared();
        let dt = Drivetrain::new(p, all_module_hardware(&world), heading_sensor(&world)).unwrap();

        let cl = ControlLoop::new(
            Params {
                cycle_period_s: PERIOD_S,
                max_consec_gyro_faults: 3,
            },
            dt,
            Teleop::new(teleop_params()),
            script.map(|s| s.parse::<DriveScript>().unwrap()),
        );

        (world, cl)
    }

    fn run(world: &SharedWorld, cl: &mut ControlLoop, from_s: f64, ticks: usize) -> TickOutput {
        let mut out = None;
        for i in 0..ticks {
            out = Some(cl.tick(from_s + i as f64 * PERIOD_S));
            world.borrow_mut().step(PERIOD_S);
        }
        out.unwrap()
    }

    #[test]
    fn test_disabled_does_not_drive() {
        let (world, mut cl) = setup(Some(
            r#"0.0: {"type": "drive", "vx_ms": 1.0, "vy_ms": 0.0, "omega_rads": 0.0};"#,
        ));

        let out = cl.tick(0.0);

        assert_eq!(out.mode, RobotMode::Disabled);
        assert_eq!(world.borrow().drive_target_ms(ModuleSlot::FrontLeft), 0.0);
    }

    #[test]
    fn test_autonomous_script() {
        let (world, mut cl) = setup(Some(
            r#"
            0.0: {"type": "reset_pose", "x_m": 1.0, "y_m": 1.0, "heading_deg": 0.0};
            0.0: {"type": "mode", "mode": "autonomous"};
            0.0: {"type": "drive", "vx_ms": 1.0, "vy_ms": 0.0, "omega_rads": 0.0, "field_relative": true};
            1.0: {"type": "stop"};
            1.5: {"type": "mode", "mode": "disabled"};
            "#,
        ));

        let out = run(&world, &mut cl, 0.0, 50);
        assert_eq!(out.mode, RobotMode::Autonomous);
        assert!(!out.safe);

        // Robot drove forward from the start pose
        let out = run(&world, &mut cl, 1.0, 30);
        assert!((out.pose.position_m.x - 2.0).abs() < 0.05);
        assert!((out.pose.position_m.y - 1.0).abs() < 1e-6);
        assert_eq!(out.mode, RobotMode::Disabled);

        // The script has now run out
        cl.tick(2.0);
        assert!(cl.script_done());
    }

    #[test]
    fn test_teleop_stick_and_buttons() {
        let (world, mut cl) = setup(Some(
            r#"
            0.0: {"type": "mode", "mode": "teleop"};
            0.0: {"type": "stick", "forward": -1.0, "strafe": 0.0, "rotate": 0.0};
            0.5: {"type": "button", "button": "a"};
            5.0: {"type": "stop"};
            "#,
        ));

        // Ramped up to full speed
        run(&world, &mut cl, 0.0, 20);
        assert!((world.borrow().drive_target_ms(ModuleSlot::FrontLeft) - 4.0).abs() < 1e-6);

        // Slow mode
        run(&world, &mut cl, 0.5, 5);
        assert!((world.borrow().drive_target_ms(ModuleSlot::FrontLeft) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gyro_faults_enter_and_leave_safe_mode() {
        let (world, mut cl) = setup(None);
        cl.set_mode(RobotMode::Teleop);
        cl.handle_cmd(DriveCmd::Drive {
            vx_ms: 1.0,
            vy_ms: 0.0,
            omega_rads: 0.0,
            field_relative: true,
        });

        world
            .borrow_mut()
            .set_fault(SimDevice::Gyro, Some(HalError::Timeout));

        // Keeps driving on the last heading until the limit is hit
        let out = run(&world, &mut cl, 0.0, 2);
        assert!(!out.safe);
        assert!(out.report.heading_fallback);

        let out = run(&world, &mut cl, 0.04, 1);
        assert!(out.safe);
        assert_eq!(world.borrow().drive_target_ms(ModuleSlot::RearLeft), 0.0);

        // Clearing the fault clears safe mode
        world.borrow_mut().clear_faults();
        let out = run(&world, &mut cl, 0.06, 1);
        assert!(!out.safe);
        let out = run(&world, &mut cl, 0.08, 1);
        assert!(out.report.is_ok());
        assert!((world.borrow().drive_target_ms(ModuleSlot::RearLeft) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_all_modules_stale_is_safe() {
        let (world, mut cl) = setup(None);
        cl.set_mode(RobotMode::Autonomous);
        cl.handle_cmd(DriveCmd::Drive {
            vx_ms: 1.0,
            vy_ms: 0.0,
            omega_rads: 0.0,
            field_relative: false,
        });

        for slot in ModuleSlot::ALL.iter() {
            world
                .borrow_mut()
                .set_fault(SimDevice::Encoder(*slot), Some(HalError::Disconnected));
        }

        let out = run(&world, &mut cl, 0.0, 1);
        assert!(out.safe);

        world.borrow_mut().clear_faults();
        let out = run(&world, &mut cl, 0.02, 1);
        assert!(!out.safe);
    }

    #[test]
    fn test_safe_mode_held_while_any_cause_remains() {
        let (world, mut cl) = setup(None);
        cl.set_mode(RobotMode::Autonomous);
        cl.handle_cmd(DriveCmd::Drive {
            vx_ms: 1.0,
            vy_ms: 0.0,
            omega_rads: 0.0,
            field_relative: false,
        });

        for slot in ModuleSlot::ALL.iter() {
            world
                .borrow_mut()
                .set_fault(SimDevice::Encoder(*slot), Some(HalError::Disconnected));
        }
        world
            .borrow_mut()
            .set_fault(SimDevice::Gyro, Some(HalError::Timeout));

        // Stale modules first, then the gyro passes its limit too
        let out = run(&world, &mut cl, 0.0, 3);
        assert!(out.safe);
        assert!(out.report.all_stale());
        assert!(out.report.gyro_faulted());

        // Encoders recover but the gyro is still out
        for slot in ModuleSlot::ALL.iter() {
            world
                .borrow_mut()
                .set_fault(SimDevice::Encoder(*slot), None);
        }
        let out = run(&world, &mut cl, 0.06, 2);
        assert!(out.safe);
        assert!(!out.report.all_stale());
        assert_eq!(world.borrow().drive_target_ms(ModuleSlot::FrontLeft), 0.0);

        // Both clear
        world.borrow_mut().set_fault(SimDevice::Gyro, None);
        let out = run(&world, &mut cl, 0.1, 1);
        assert!(!out.safe);
        let out = run(&world, &mut cl, 0.12, 1);
        assert!(out.report.is_ok());
        assert!((world.borrow().drive_target_ms(ModuleSlot::FrontLeft) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_params_validate() {
        let mut p = Params {
            cycle_period_s: PERIOD_S,
            max_consec_gyro_faults: 3,
        };
        assert!(p.validate().is_ok());

        for bad in [0.0, -0.02, f64::NAN, f64::INFINITY].iter() {
            p.cycle_period_s = *bad;
            assert!(matches!(
                p.validate(),
                Err(ParamsError::InvalidParam { name: "cycle_period_s", .. })
            ));
        }

        p.cycle_period_s = PERIOD_S;
        p.max_consec_gyro_faults = 0;
        assert_eq!(
            p.validate(),
            Err(ParamsError::InvalidParam {
                name: "max_consec_gyro_faults",
                value: 0.0
            })
        );
    }
}
