//! # Hardware abstraction layer
//!
//! The drivetrain talks to its motor controllers and sensors only through the
//! capability traits in this module. Every call returns a `Result`, so a
//! device fault shows up in the signature of whatever uses it and can be
//! handled per tick instead of unwinding out of the control loop.
//!
//! Implementations must not block: a call that cannot complete within the
//! tick budget shall return `HalError::Timeout`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Simulated hardware used by the executable and by tests.
#[cfg(any(test, feature = "sim"))]
pub mod sim;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::geom::Rotation;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Closed loop gains for a motor controller.
///
/// These are passed straight through to the device, the drivetrain never
/// interprets them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub k_p: f64,
    pub k_i: f64,
    pub k_d: f64,

    /// Velocity feed-forward
    #[serde(default)]
    pub k_ff: f64,

    /// Output limits, normalised to the motor's full output.
    #[serde(default = "default_output_range")]
    pub output_range: (f64, f64),
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors reported by hardware devices.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HalError {
    #[error("The device did not respond within the tick budget")]
    Timeout,

    #[error("The device is not connected")]
    Disconnected,

    #[error("The device rejected the command: {0}")]
    Rejected(String),

    #[error("The device returned an invalid reading ({0})")]
    InvalidReading(f64),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A wheel drive motor running a velocity closed loop.
pub trait DriveActuator {
    /// Push closed loop gains to the motor controller.
    fn configure(&mut self, gains: &PidGains) -> Result<(), HalError>;

    /// Set the target motor shaft velocity.
    ///
    /// Units: radians/second
    fn set_velocity_target(&mut self, motor_rads: f64) -> Result<(), HalError>;

    /// Get the measured motor shaft velocity.
    ///
    /// Units: radians/second
    fn velocity(&mut self) -> Result<f64, HalError>;

    /// Get the cumulative, signed distance driven by the wheel.
    ///
    /// Units: meters
    fn distance(&mut self) -> Result<f64, HalError>;
}

/// A steering motor running a position closed loop on its relative encoder.
pub trait TurnActuator {
    /// Push closed loop gains to the motor controller.
    fn configure(&mut self, gains: &PidGains) -> Result<(), HalError>;

    /// Overwrite the motor's relative encoder position.
    ///
    /// Units: radians (motor shaft)
    fn seed_position(&mut self, motor_rad: f64) -> Result<(), HalError>;

    /// Set the target motor shaft position.
    ///
    /// Units: radians (motor shaft)
    fn set_position_target(&mut self, motor_rad: f64) -> Result<(), HalError>;
}

/// An absolute encoder on the steering axis of a module.
pub trait AbsoluteEncoder {
    /// Read the steering angle. Wraps continuously at a full turn.
    fn angle(&mut self) -> Result<Rotation, HalError>;
}

/// The robot's heading sensor.
pub trait HeadingSensor {
    /// Read the heading, anticlockwise positive.
    fn heading(&mut self) -> Result<Rotation, HalError>;

    /// Make the current heading read as zero.
    fn zero(&mut self) -> Result<(), HalError>;
}

/// The set of devices making up one swerve module.
pub struct ModuleHardware {
    pub drive: Box<dyn DriveActuator>,
    pub turn: Box<dyn TurnActuator>,
    pub encoder: Box<dyn AbsoluteEncoder>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PidGains {
    fn default() -> Self {
        Self {
            k_p: 0.0,
            k_i: 0.0,
            k_d: 0.0,
            k_ff: 0.0,
            output_range: default_output_range(),
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn default_output_range() -> (f64, f64) {
    (-1.0, 1.0)
}
