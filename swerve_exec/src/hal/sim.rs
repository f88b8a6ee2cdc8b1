//! Simulated swerve hardware
//!
//! All simulated devices share one `SimWorld` through an `Rc<RefCell<_>>`,
//! so the world can be stepped and inspected while the drivetrain owns the
//! device handles. Steering follows its target with a first-order lag, drive
//! wheels track their velocity target instantly, and the gyro reports the
//! heading of the true chassis motion implied by the actual module states.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use nalgebra::Vector2;
use std::{cell::RefCell, rc::Rc};

// Internal
use super::{
    AbsoluteEncoder, DriveActuator, HalError, HeadingSensor, ModuleHardware, PidGains,
    TurnActuator,
};
use crate::geom::{Pose2d, Rotation, Twist2d};
use crate::kinematics::{
    ChassisSpeeds, KinematicsError, ModuleSlot, ModuleState, SwerveKinematics, NUM_MODULES,
};
use crate::module_ctrl;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A world shared between the simulated devices.
pub type SharedWorld = Rc<RefCell<SimWorld>>;

/// The simulated physical state of the drivetrain.
pub struct SimWorld {
    module_params: module_ctrl::Params,
    steer_time_const_s: f64,
    kinematics: SwerveKinematics,

    modules: [SimModule; NUM_MODULES],

    true_pose: Pose2d,
    true_speeds: ChassisSpeeds,

    gyro_zero: Rotation,
    gyro_fault: Option<HalError>,

    /// Devices whose readings come back as NaN.
    garbled: Vec<SimDevice>,
}

/// The state of one simulated module.
#[derive(Clone, Debug, Default)]
struct SimModule {
    /// Steering angle, not wrapped.
    steer_rad: f64,

    /// Steering target, not wrapped.
    steer_target_rad: f64,

    /// Offset of the turn motor's relative encoder from the true shaft angle.
    turn_encoder_offset_rad: f64,

    drive_target_ms: f64,
    speed_ms: f64,
    distance_m: f64,

    drive_gains: Option<PidGains>,
    turn_gains: Option<PidGains>,

    drive_fault: Option<HalError>,
    turn_fault: Option<HalError>,
    encoder_fault: Option<HalError>,
}

/// Simulated drive motor handle.
pub struct SimDrive {
    world: SharedWorld,
    slot: ModuleSlot,
}

/// Simulated turn motor handle.
pub struct SimTurn {
    world: SharedWorld,
    slot: ModuleSlot,
}

/// Simulated absolute steering encoder handle.
pub struct SimEncoder {
    world: SharedWorld,
    slot: ModuleSlot,
}

/// Simulated gyro handle.
pub struct SimGyro {
    world: SharedWorld,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A device which can have faults injected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimDevice {
    Drive(ModuleSlot),
    Turn(ModuleSlot),
    Encoder(ModuleSlot),
    Gyro,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimWorld {
    /// Create a new world with the robot at the origin and every module
    /// pointing forward.
    pub fn new(
        offsets_m_rb: [Vector2<f64>; NUM_MODULES],
        module_params: module_ctrl::Params,
        steer_time_const_s: f64,
    ) -> Result<Self, KinematicsError> {
        Ok(Self {
            module_params,
            steer_time_const_s: steer_time_const_s.max(0.0),
            kinematics: SwerveKinematics::new(offsets_m_rb)?,
            modules: Default::default(),
            true_pose: Pose2d::default(),
            true_speeds: ChassisSpeeds::default(),
            gyro_zero: Rotation::default(),
            gyro_fault: None,
            garbled: Vec::new(),
        })
    }

    /// Wrap the world so it can be shared with device handles.
    pub fn into_shared(self) -> SharedWorld {
        Rc::new(RefCell::new(self))
    }

    /// Advance the simulation by `dt_s` seconds.
    pub fn step(&mut self, dt_s: f64) {
        let alpha = if self.steer_time_const_s > 0.0 {
            1.0 - (-dt_s / self.steer_time_const_s).exp()
        } else {
            1.0
        };

        let mut states = [ModuleState::default(); NUM_MODULES];
        for (m, s) in self.modules.iter_mut().zip(states.iter_mut()) {
            m.steer_rad += (m.steer_target_rad - m.steer_rad) * alpha;
            m.speed_ms = m.drive_target_ms;
            m.distance_m += m.speed_ms * dt_s;

            *s = ModuleState::new(m.speed_ms, Rotation::from_rad(m.steer_rad));
        }

        self.true_speeds = self.kinematics.to_chassis_speeds(&states);
        self.true_pose = self.true_pose.exp(&Twist2d {
            dx_m: self.true_speeds.vx_ms * dt_s,
            dy_m: self.true_speeds.vy_ms * dt_s,
            dtheta_rad: self.true_speeds.omega_rads * dt_s,
        });

        trace!("Sim true pose {}", self.true_pose);
    }

    /// Inject a fault into a device, or clear it with `None`.
    pub fn set_fault(&mut self, device: SimDevice, fault: Option<HalError>) {
        debug!("Sim fault on {:?} set to {:?}", device, fault);

        match device {
            SimDevice::Drive(slot) => self.module_mut(slot).drive_fault = fault,
            SimDevice::Turn(slot) => self.module_mut(slot).turn_fault = fault,
            SimDevice::Encoder(slot) => self.module_mut(slot).encoder_fault = fault,
            SimDevice::Gyro => self.gyro_fault = fault,
        }
    }

    /// Clear all injected faults.
    pub fn clear_faults(&mut self) {
        for m in self.modules.iter_mut() {
            m.drive_fault = None;
            m.turn_fault = None;
            m.encoder_fault = None;
        }
        self.gyro_fault = None;
        self.garbled.clear();
    }

    /// Make a device's readings NaN (`true`) or valid again (`false`).
    pub fn set_garbled(&mut self, device: SimDevice, garbled: bool) {
        debug!("Sim readings from {:?} garbled: {}", device, garbled);

        self.garbled.retain(|d| *d != device);
        if garbled {
            self.garbled.push(device);
        }
    }

    fn reading(&self, device: SimDevice, value: f64) -> f64 {
        if self.garbled.contains(&device) {
            f64::NAN
        } else {
            value
        }
    }

    /// Place a module's steering at the given angle, e.g. to set up a test.
    pub fn set_steer_angle(&mut self, slot: ModuleSlot, angle: Rotation) {
        let m = self.module_mut(slot);
        m.steer_rad = angle.rad();
        m.steer_target_rad = angle.rad();
    }

    /// The true steering angle of a module.
    pub fn steer_angle(&self, slot: ModuleSlot) -> Rotation {
        Rotation::from_rad(self.module(slot).steer_rad)
    }

    /// The angle the module is steering towards.
    pub fn steer_target(&self, slot: ModuleSlot) -> Rotation {
        Rotation::from_rad(self.module(slot).steer_target_rad)
    }

    /// Steering travel still to go, not wrapped.
    pub fn steer_travel_rad(&self, slot: ModuleSlot) -> f64 {
        let m = self.module(slot);
        m.steer_target_rad - m.steer_rad
    }

    /// The demanded wheel ground speed.
    pub fn drive_target_ms(&self, slot: ModuleSlot) -> f64 {
        self.module(slot).drive_target_ms
    }

    /// The gains last pushed to a module's (drive, turn) motors.
    pub fn gains(&self, slot: ModuleSlot) -> (Option<PidGains>, Option<PidGains>) {
        let m = self.module(slot);
        (m.drive_gains, m.turn_gains)
    }

    /// The pose the robot has actually reached.
    pub fn true_pose(&self) -> Pose2d {
        self.true_pose
    }

    /// The robot-relative chassis speeds the robot is actually moving at.
    pub fn true_speeds(&self) -> ChassisSpeeds {
        self.true_speeds
    }

    fn module(&self, slot: ModuleSlot) -> &SimModule {
        &self.modules[slot.index()]
    }

    fn module_mut(&mut self, slot: ModuleSlot) -> &mut SimModule {
        &mut self.modules[slot.index()]
    }
}

impl SimDrive {
    pub fn new(world: &SharedWorld, slot: ModuleSlot) -> Self {
        Self {
            world: Rc::clone(world),
            slot,
        }
    }
}

impl SimTurn {
    pub fn new(world: &SharedWorld, slot: ModuleSlot) -> Self {
        Self {
            world: Rc::clone(world),
            slot,
        }
    }
}

impl SimEncoder {
    pub fn new(world: &SharedWorld, slot: ModuleSlot) -> Self {
        Self {
            world: Rc::clone(world),
            slot,
        }
    }
}

impl SimGyro {
    pub fn new(world: &SharedWorld) -> Self {
        Self {
            world: Rc::clone(world),
        }
    }
}

impl DriveActuator for SimDrive {
    fn configure(&mut self, gains: &PidGains) -> Result<(), HalError> {
        let mut world = self.world.borrow_mut();
        let m = world.module_mut(self.slot);
        check(&m.drive_fault)?;
        m.drive_gains = Some(*gains);
        Ok(())
    }

    fn set_velocity_target(&mut self, motor_rads: f64) -> Result<(), HalError> {
        let mut world = self.world.borrow_mut();
        let speed_ms = world.module_params.motor_rads_to_speed(motor_rads);
        let m = world.module_mut(self.slot);
        check(&m.drive_fault)?;
        m.drive_target_ms = speed_ms;
        Ok(())
    }

    fn velocity(&mut self) -> Result<f64, HalError> {
        let world = self.world.borrow();
        let m = world.module(self.slot);
        check(&m.drive_fault)?;
        Ok(world.reading(
            SimDevice::Drive(self.slot),
            world.module_params.speed_to_motor_rads(m.speed_ms),
        ))
    }

    fn distance(&mut self) -> Result<f64, HalError> {
        let world = self.world.borrow();
        let m = world.module(self.slot);
        check(&m.drive_fault)?;
        Ok(world.reading(SimDevice::Drive(self.slot), m.distance_m))
    }
}

impl TurnActuator for SimTurn {
    fn configure(&mut self, gains: &PidGains) -> Result<(), HalError> {
        let mut world = self.world.borrow_mut();
        let m = world.module_mut(self.slot);
        check(&m.turn_fault)?;
        m.turn_gains = Some(*gains);
        Ok(())
    }

    fn seed_position(&mut self, motor_rad: f64) -> Result<(), HalError> {
        let mut world = self.world.borrow_mut();
        let ratio = world.module_params.turn_gear_ratio;
        let m = world.module_mut(self.slot);
        check(&m.turn_fault)?;
        m.turn_encoder_offset_rad = motor_rad - m.steer_rad * ratio;
        Ok(())
    }

    fn set_position_target(&mut self, motor_rad: f64) -> Result<(), HalError> {
        let mut world = self.world.borrow_mut();
        let ratio = world.module_params.turn_gear_ratio;
        let m = world.module_mut(self.slot);
        check(&m.turn_fault)?;
        m.steer_target_rad = (motor_rad - m.turn_encoder_offset_rad) / ratio;
        Ok(())
    }
}

impl AbsoluteEncoder for SimEncoder {
    fn angle(&mut self) -> Result<Rotation, HalError> {
        let world = self.world.borrow();
        let m = world.module(self.slot);
        check(&m.encoder_fault)?;
        Ok(Rotation::from_rad(
            world.reading(SimDevice::Encoder(self.slot), m.steer_rad),
        ))
    }
}

impl HeadingSensor for SimGyro {
    fn heading(&mut self) -> Result<Rotation, HalError> {
        let world = self.world.borrow();
        check(&world.gyro_fault)?;
        let heading = world.true_pose.heading - world.gyro_zero;
        Ok(Rotation::from_rad(world.reading(SimDevice::Gyro, heading.rad())))
    }

    fn zero(&mut self) -> Result<(), HalError> {
        let mut world = self.world.borrow_mut();
        check(&world.gyro_fault)?;
        world.gyro_zero = world.true_pose.heading;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the device handles for one module.
pub fn module_hardware(world: &SharedWorld, slot: ModuleSlot) -> ModuleHardware {
    ModuleHardware {
        drive: Box::new(SimDrive::new(world, slot)),
        turn: Box::new(SimTurn::new(world, slot)),
        encoder: Box::new(SimEncoder::new(world, slot)),
    }
}

/// Build the device handles for all four modules, in `ModuleSlot::ALL` order.
pub fn all_module_hardware(world: &SharedWorld) -> [ModuleHardware; NUM_MODULES] {
    [
        module_hardware(world, ModuleSlot::FrontLeft),
        module_hardware(world, ModuleSlot::FrontRight),
        module_hardware(world, ModuleSlot::RearLeft),
        module_hardware(world, ModuleSlot::RearRight),
    ]
}

/// Build the gyro handle.
pub fn heading_sensor(world: &SharedWorld) -> Box<dyn HeadingSensor> {
    Box::new(SimGyro::new(world))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn check(fault: &Option<HalError>) -> Result<(), HalError> {
    match fault {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn world() -> SharedWorld {
        SimWorld::new(
            [
                Vector2::new(0.3, 0.3),
                Vector2::new(0.3, -0.3),
                Vector2::new(-0.3, 0.3),
                Vector2::new(-0.3, -0.3),
            ],
            module_ctrl::Params::default(),
            0.05,
        )
        .unwrap()
        .into_shared()
    }

    #[test]
    fn test_steering_lags_target() {
        let w = world();
        let mut turn = SimTurn::new(&w, ModuleSlot::FrontLeft);
        let ratio = module_ctrl::Params::default().turn_gear_ratio;

        turn.seed_position(0.0).unwrap();
        turn.set_position_target(1.0 * ratio).unwrap();

        w.borrow_mut().step(0.02);
        let after_one = w.borrow().steer_angle(ModuleSlot::FrontLeft).rad();
        assert!(after_one > 0.0 && after_one < 1.0);

        for _ in 0..100 {
            w.borrow_mut().step(0.02);
        }
        assert!((w.borrow().steer_angle(ModuleSlot::FrontLeft).rad() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_seeding_removes_wraps() {
        let w = world();
        w.borrow_mut()
            .set_steer_angle(ModuleSlot::RearLeft, Rotation::from_deg(170.0));
        let mut turn = SimTurn::new(&w, ModuleSlot::RearLeft);
        let ratio = module_ctrl::Params::default().turn_gear_ratio;

        // Seed with the wrapped measurement, then ask for 20 degrees more
        let measured = 170f64.to_radians();
        turn.seed_position(measured * ratio).unwrap();
        turn.set_position_target((measured + 20f64.to_radians()) * ratio)
            .unwrap();

        let travel = w.borrow().steer_travel_rad(ModuleSlot::RearLeft);
        assert!((travel - 20f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn test_drive_and_gyro() {
        let w = world();
        let params = module_ctrl::Params::default();
        let mut drives: Vec<SimDrive> = ModuleSlot::ALL
            .iter()
            .map(|s| SimDrive::new(&w, *s))
            .collect();

        for d in drives.iter_mut() {
            d.set_velocity_target(params.speed_to_motor_rads(1.0)).unwrap();
        }
        for _ in 0..50 {
            w.borrow_mut().step(0.02);
        }

        assert!((drives[0].distance().unwrap() - 1.0).abs() < 1e-9);
        assert!((w.borrow().true_pose().position_m.x - 1.0).abs() < 1e-9);

        let mut gyro = SimGyro::new(&w);
        assert!(gyro.heading().unwrap().rad().abs() < 1e-12);
    }

    #[test]
    fn test_fault_injection() {
        let w = world();
        let mut enc = SimEncoder::new(&w, ModuleSlot::FrontRight);
        let mut gyro = SimGyro::new(&w);

        w.borrow_mut()
            .set_fault(SimDevice::Encoder(ModuleSlot::FrontRight), Some(HalError::Timeout));
        w.borrow_mut().set_fault(SimDevice::Gyro, Some(HalError::Disconnected));

        assert_eq!(enc.angle(), Err(HalError::Timeout));
        assert_eq!(gyro.heading(), Err(HalError::Disconnected));

        w.borrow_mut().clear_faults();
        assert!(enc.angle().is_ok());
        assert!(gyro.zero().is_ok());
    }
}
