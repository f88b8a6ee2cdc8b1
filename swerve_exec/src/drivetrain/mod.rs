//! # Drivetrain coordinator
//!
//! The `Drivetrain` owns the four module controllers, the kinematics and the
//! odometry, and exposes the robot level interface used by the control loop:
//! `drive`, `update_odometry`, `pose`, `reset_pose`, `robot_relative_speeds`
//! and `zero_heading`.
//!
//! Hardware faults during a tick never abort the tick. They are collected
//! into a `DriveReport` with the module and operation they came from, and
//! the affected module is degraded according to the `StalePolicy`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub(crate) mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::fmt;

// Internal
pub use params::*;
pub use state::*;

use crate::{
    fault::FaultKind,
    hal::HalError,
    kinematics::{KinematicsError, ModuleSlot, ModuleState, NUM_MODULES},
    module_ctrl::ModuleError,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A fault raised during a drivetrain operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveFault {
    /// The module concerned, `None` for chassis level faults.
    pub module: Option<ModuleSlot>,

    /// What the drivetrain was doing.
    pub op: DriveOp,

    pub error: DrivetrainError,
}

/// Report from a drivetrain operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveReport {
    /// The state commanded to each module this tick, zero speed if the
    /// module wasn't commanded.
    pub commanded: [ModuleState; NUM_MODULES],

    /// Factor applied by desaturation (1.0 if none was needed).
    pub desaturation_factor: f64,

    /// True if the gyro couldn't be read and the last known heading was
    /// used instead.
    pub heading_fallback: bool,

    /// Modules whose sensors faulted on their most recent access.
    pub stale: [bool; NUM_MODULES],

    pub faults: Vec<DriveFault>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Drivetrain operations which can fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriveOp {
    Kinematics,
    SetState,
    Stop,
    ReadHeading,
    ReadPosition,
    ReadState,
    ZeroHeading,
}

/// Possible errors from the drivetrain.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DrivetrainError {
    #[error("Invalid drivetrain parameter {name} = {value}")]
    InvalidParam { name: &'static str, value: f64 },

    #[error("Invalid module parameters: {0}")]
    ModuleParams(#[source] ModuleError),

    #[error("Kinematics error: {0}")]
    Kinematics(#[from] KinematicsError),

    #[error("{slot} module error: {source}")]
    Module {
        slot: ModuleSlot,
        #[source]
        source: ModuleError,
    },

    #[error("Gyro error: {0}")]
    Gyro(#[source] HalError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DrivetrainError {
    /// The class of this fault.
    pub fn kind(&self) -> FaultKind {
        match self {
            DrivetrainError::InvalidParam { .. } | DrivetrainError::ModuleParams(_) => {
                FaultKind::Configuration
            }
            DrivetrainError::Kinematics(e) => e.kind(),
            DrivetrainError::Module { source, .. } => source.kind(),
            DrivetrainError::Gyro(_) => FaultKind::Sensor,
        }
    }
}

impl fmt::Display for DriveFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.module {
            Some(slot) => write!(
                f,
                "[{}] {} during {:?}: {}",
                self.error.kind(),
                slot,
                self.op,
                self.error
            ),
            None => write!(f, "[{}] {:?}: {}", self.error.kind(), self.op, self.error),
        }
    }
}

impl Default for DriveReport {
    fn default() -> Self {
        Self {
            commanded: [ModuleState::default(); NUM_MODULES],
            desaturation_factor: 1.0,
            heading_fallback: false,
            stale: [false; NUM_MODULES],
            faults: Vec::new(),
        }
    }
}

impl DriveReport {
    /// True if nothing faulted.
    pub fn is_ok(&self) -> bool {
        self.faults.is_empty()
    }

    /// True if any fault was a gyro fault.
    pub fn gyro_faulted(&self) -> bool {
        self.faults
            .iter()
            .any(|f| matches!(f.error, DrivetrainError::Gyro(_)))
    }

    /// True if every module is stale.
    pub fn all_stale(&self) -> bool {
        self.stale.iter().all(|s| *s)
    }

    /// Record a fault.
    pub fn push(&mut self, module: Option<ModuleSlot>, op: DriveOp, error: DrivetrainError) {
        self.faults.push(DriveFault { module, op, error });
    }

    /// Fold another report for the same tick into this one.
    pub fn merge(&mut self, other: DriveReport) {
        self.heading_fallback |= other.heading_fallback;
        self.stale = other.stale;
        self.faults.extend(other.faults);
    }
}
