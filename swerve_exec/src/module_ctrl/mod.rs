//! # Swerve module control
//!
//! A `ModuleCtrl` drives one swerve module. Each tick it takes a desired
//! `ModuleState`, reads the measured steering angle from the absolute
//! encoder, picks the shortest steering move (flipping the wheel direction if
//! that saves more than a quarter turn), throttles the drive speed by the
//! cosine of the remaining steering error and writes the resulting setpoints
//! to the drive and turn motor controllers.
//!
//! Device failures are returned to the caller rather than retried, the
//! owning drivetrain decides how to degrade.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod optimise;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use optimise::*;
pub use params::*;
pub use state::*;

use crate::{fault::FaultKind, hal::HalError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Which of the module's motors an error concerns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Actuator {
    Drive,
    Turn,
}

/// Possible errors that can occur during module control.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModuleError {
    #[error("Invalid module parameter {name} = {value}")]
    InvalidParam { name: &'static str, value: f64 },

    #[error("Could not configure the {actuator:?} motor controller: {source}")]
    ConfigureFailed {
        actuator: Actuator,
        #[source]
        source: HalError,
    },

    #[error("Could not read the absolute steering encoder: {0}")]
    EncoderFault(#[source] HalError),

    #[error("Could not read the drive encoder: {0}")]
    DriveReadFault(#[source] HalError),

    #[error("The {actuator:?} motor controller rejected its command: {source}")]
    CommandFault {
        actuator: Actuator,
        #[source]
        source: HalError,
    },

    #[error("The target state is not finite: speed {speed_ms}, angle {angle_rad}")]
    NonFiniteTarget { speed_ms: f64, angle_rad: f64 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModuleError {
    /// The class of this fault.
    pub fn kind(&self) -> FaultKind {
        match self {
            ModuleError::InvalidParam { .. } | ModuleError::ConfigureFailed { .. } => {
                FaultKind::Configuration
            }
            ModuleError::EncoderFault(_) | ModuleError::DriveReadFault(_) => FaultKind::Sensor,
            ModuleError::CommandFault { .. } => FaultKind::Actuator,
            ModuleError::NonFiniteTarget { .. } => FaultKind::NumericDegenerate,
        }
    }
}
