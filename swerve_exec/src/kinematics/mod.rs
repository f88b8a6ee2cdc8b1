//! # Swerve kinematics module
//!
//! Stateless conversion between a chassis velocity and the four module
//! velocities, and back again.
//!
//! The forward path (`SwerveKinematics::to_module_states`) computes each
//! module's velocity as the chassis translation plus the rotational term
//! `omega x r` for that module's offset `r`. The inverse path solves the
//! over-determined system (8 equations, 3 unknowns) in the least squares
//! sense using a pseudo-inverse built once from the module layout, so any
//! non-degenerate four module layout is supported.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod chassis;
mod desaturate;
mod swerve;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use std::fmt;

// Internal
use crate::{fault::FaultKind, geom::Rotation};
pub use desaturate::*;
pub use swerve::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of swerve modules on the robot.
pub const NUM_MODULES: usize = 4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The velocity of the robot chassis.
///
/// The struct does not track which frame it's in, the caller does. Most
/// functions take robot-relative speeds, conversions to and from the field
/// frame are provided.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    /// Forward (robot) or field +X velocity.
    ///
    /// Units: meters/second
    pub vx_ms: f64,

    /// Leftward (robot) or field +Y velocity.
    ///
    /// Units: meters/second
    pub vy_ms: f64,

    /// Anticlockwise rotation rate.
    ///
    /// Units: radians/second
    pub omega_rads: f64,
}

/// The velocity of a single module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// Signed wheel ground speed.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// Steering angle relative to the robot body +X axis.
    pub angle: Rotation,
}

/// The accumulated travel of a single module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    /// Cumulative signed distance driven by the wheel.
    ///
    /// Units: meters
    pub distance_m: f64,

    /// Steering angle relative to the robot body +X axis.
    pub angle: Rotation,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Identifies one of the four module slots.
///
/// Arrays of per-module data in this crate are always ordered as
/// `ModuleSlot::ALL`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleSlot {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

/// Errors raised by the kinematics functions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KinematicsError {
    #[error("The module layout cannot resolve rotation from translation (all modules coincident)")]
    DegenerateGeometry,

    #[error("Module offset for {0} is not finite")]
    NonFiniteOffset(ModuleSlot),

    #[error("Maximum speed must be positive and finite, found {0}")]
    InvalidMaxSpeed(f64),

    #[error("The control period must be positive and finite, found {0} s")]
    InvalidPeriod(f64),

    #[error("Input contains a non-finite value")]
    NonFiniteInput,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ChassisSpeeds {
    pub const fn new(vx_ms: f64, vy_ms: f64, omega_rads: f64) -> Self {
        Self {
            vx_ms,
            vy_ms,
            omega_rads,
        }
    }

    /// True if all components are finite.
    pub fn is_finite(&self) -> bool {
        self.vx_ms.is_finite() && self.vy_ms.is_finite() && self.omega_rads.is_finite()
    }
}

impl fmt::Display for ChassisSpeeds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(vx: {:.3} m/s, vy: {:.3} m/s, omega: {:.3} rad/s)",
            self.vx_ms, self.vy_ms, self.omega_rads
        )
    }
}

impl ModuleState {
    pub fn new(speed_ms: f64, angle: Rotation) -> Self {
        Self { speed_ms, angle }
    }

    /// True if both speed and angle are finite.
    pub fn is_finite(&self) -> bool {
        self.speed_ms.is_finite() && self.angle.is_finite()
    }
}

impl ModulePosition {
    pub fn new(distance_m: f64, angle: Rotation) -> Self {
        Self { distance_m, angle }
    }
}

impl ModuleSlot {
    /// All slots in array order.
    pub const ALL: [ModuleSlot; NUM_MODULES] = [
        ModuleSlot::FrontLeft,
        ModuleSlot::FrontRight,
        ModuleSlot::RearLeft,
        ModuleSlot::RearRight,
    ];

    /// Index of this slot in per-module arrays.
    pub fn index(self) -> usize {
        match self {
            ModuleSlot::FrontLeft => 0,
            ModuleSlot::FrontRight => 1,
            ModuleSlot::RearLeft => 2,
            ModuleSlot::RearRight => 3,
        }
    }
}

impl fmt::Display for ModuleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleSlot::FrontLeft => "FL",
            ModuleSlot::FrontRight => "FR",
            ModuleSlot::RearLeft => "RL",
            ModuleSlot::RearRight => "RR",
        };
        write!(f, "{}", s)
    }
}

impl KinematicsError {
    /// The class of this fault.
    pub fn kind(&self) -> FaultKind {
        match self {
            KinematicsError::DegenerateGeometry
            | KinematicsError::NonFiniteOffset(_)
            | KinematicsError::InvalidMaxSpeed(_) => FaultKind::Configuration,
            KinematicsError::InvalidPeriod(_) | KinematicsError::NonFiniteInput => {
                FaultKind::NumericDegenerate
            }
        }
    }
}
