//! Steering angle optimisation and cosine speed compensation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::f64::consts::{FRAC_PI_2, PI};

use crate::geom::Rotation;
use crate::kinematics::ModuleState;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A target state after optimisation against the measured steering angle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Optimised {
    /// The (possibly flipped) target.
    pub state: ModuleState,

    /// Steering travel from the measured angle to `state.angle`, always in
    /// [-90, 90] degrees.
    pub delta: Rotation,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Choose the shortest steering move which satisfies `target`.
///
/// If reaching the target angle needs more than a quarter turn, the module
/// points the opposite way and drives backwards instead.
pub fn optimise(target: ModuleState, current: Rotation) -> Optimised {
    let delta = target.angle - current;

    if delta.rad().abs() > FRAC_PI_2 {
        let flip = Rotation::from_rad(PI);
        Optimised {
            state: ModuleState::new(-target.speed_ms, target.angle + flip),
            delta: delta + flip,
        }
    } else {
        Optimised {
            state: target,
            delta,
        }
    }
}

/// Scale an optimised speed by how well the module is currently aligned with
/// its target, so an unaligned module doesn't push the robot off course.
///
/// `delta` must come from `optimise`, so the cosine is never negative and the
/// sign of the speed is kept.
pub fn cosine_compensate(speed_ms: f64, delta: Rotation) -> f64 {
    speed_ms * delta.cos().max(0.0)
}
