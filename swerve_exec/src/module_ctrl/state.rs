//! Implementation of the swerve module controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};

// Internal
use super::{cosine_compensate, optimise, Actuator, ModuleError, Params};
use crate::geom::Rotation;
use crate::hal::{HalError, ModuleHardware};
use crate::kinematics::{ModulePosition, ModuleSlot, ModuleState};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Controller for a single swerve module.
pub struct ModuleCtrl {
    slot: ModuleSlot,
    params: Params,
    hw: ModuleHardware,

    /// The last steering angle commanded, held while the module is stopped.
    hold_angle: Rotation,

    /// The last state written to the motors.
    last_command: ModuleState,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModuleCtrl {
    /// Create a new controller, pushing the PID gains to both motors.
    ///
    /// The steering hold angle starts at the measured angle if the encoder
    /// can be read, otherwise at zero.
    pub fn new(slot: ModuleSlot, params: Params, mut hw: ModuleHardware) -> Result<Self, ModuleError> {
        params.validate()?;

        hw.drive
            .configure(&params.drive_gains)
            .map_err(|source| ModuleError::ConfigureFailed {
                actuator: Actuator::Drive,
                source,
            })?;
        hw.turn
            .configure(&params.turn_gains)
            .map_err(|source| ModuleError::ConfigureFailed {
                actuator: Actuator::Turn,
                source,
            })?;

        let hold_angle = match read_angle(&mut hw) {
            Ok(a) => a,
            Err(e) => {
                warn!("{} module: could not read initial steering angle: {}", slot, e);
                Rotation::default()
            }
        };

        Ok(Self {
            slot,
            params,
            hw,
            hold_angle,
            last_command: ModuleState::new(0.0, hold_angle),
        })
    }

    /// The slot this module is mounted in.
    pub fn slot(&self) -> ModuleSlot {
        self.slot
    }

    /// The last state written to the motors.
    pub fn last_command(&self) -> ModuleState {
        self.last_command
    }

    /// Drive the module towards `target`.
    ///
    /// Returns the state actually commanded: optimised against the measured
    /// steering angle and cosine compensated.
    ///
    /// If the steering encoder can't be read nothing is written. Otherwise
    /// both motors are commanded independently, so a rejected drive command
    /// doesn't stop the turn command and vice versa, and the first failure
    /// is returned.
    pub fn set_desired_state(&mut self, target: ModuleState) -> Result<ModuleState, ModuleError> {
        if !target.is_finite() {
            return Err(ModuleError::NonFiniteTarget {
                speed_ms: target.speed_ms,
                angle_rad: target.angle.rad(),
            });
        }

        let measured = read_angle(&mut self.hw)?;

        // No direction for a stopped wheel, hold the last angle
        let target = if target.speed_ms.abs() < self.params.zero_speed_threshold_ms {
            ModuleState::new(0.0, self.hold_angle)
        } else {
            target
        };

        let opt = optimise(target, measured);
        let speed_ms = cosine_compensate(opt.state.speed_ms, opt.delta);
        let command = ModuleState::new(speed_ms, opt.state.angle);

        let drive_res = self
            .hw
            .drive
            .set_velocity_target(self.params.speed_to_motor_rads(speed_ms));

        // Seed the relative encoder from the absolute one so the shaft target
        // is always the short way round.
        let ratio = self.params.turn_gear_ratio;
        let turn_res = self
            .hw
            .turn
            .seed_position(measured.rad() * ratio)
            .and_then(|_| {
                self.hw
                    .turn
                    .set_position_target((measured.rad() + opt.delta.rad()) * ratio)
            });

        if turn_res.is_ok() {
            self.hold_angle = command.angle;
        }
        self.last_command = command;

        trace!(
            "{} module: measured {}, commanded {:.3} m/s at {}",
            self.slot,
            measured,
            command.speed_ms,
            command.angle
        );

        drive_res.map_err(|source| ModuleError::CommandFault {
            actuator: Actuator::Drive,
            source,
        })?;
        turn_res.map_err(|source| ModuleError::CommandFault {
            actuator: Actuator::Turn,
            source,
        })?;

        Ok(command)
    }

    /// Command zero drive speed, leaving steering where it is.
    pub fn stop(&mut self) -> Result<(), ModuleError> {
        self.hw
            .drive
            .set_velocity_target(0.0)
            .map_err(|source| ModuleError::CommandFault {
                actuator: Actuator::Drive,
                source,
            })?;

        self.last_command.speed_ms = 0.0;
        Ok(())
    }

    /// Read the module's accumulated drive distance and steering angle.
    pub fn position(&mut self) -> Result<ModulePosition, ModuleError> {
        let distance_m = self
            .hw
            .drive
            .distance()
            .and_then(finite)
            .map_err(ModuleError::DriveReadFault)?;
        let angle = read_angle(&mut self.hw)?;

        Ok(ModulePosition::new(distance_m, angle))
    }

    /// Read the module's wheel speed and steering angle.
    pub fn state(&mut self) -> Result<ModuleState, ModuleError> {
        let motor_rads = self
            .hw
            .drive
            .velocity()
            .and_then(finite)
            .map_err(ModuleError::DriveReadFault)?;
        let angle = read_angle(&mut self.hw)?;

        Ok(ModuleState::new(
            self.params.motor_rads_to_speed(motor_rads),
            angle,
        ))
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Read the absolute steering angle, rejecting NaN.
fn read_angle(hw: &mut ModuleHardware) -> Result<Rotation, ModuleError> {
    hw.encoder
        .angle()
        .and_then(|a| finite(a.rad()).map(|_| a))
        .map_err(ModuleError::EncoderFault)
}

fn finite(value: f64) -> Result<f64, HalError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(HalError::InvalidReading(value))
    }
}
