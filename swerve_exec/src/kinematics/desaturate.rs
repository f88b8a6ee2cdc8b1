//! Wheel speed desaturation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{ChassisSpeeds, KinematicsError, ModuleState, NUM_MODULES};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Scale all module speeds down by a common factor so none exceeds
/// `max_speed_ms`.
///
/// Scaling every module by the same factor keeps the direction and curvature
/// of the commanded motion, clamping wheels individually would not. Speeds
/// are never increased.
///
/// Returns the factor applied (1.0 if no scaling was needed).
///
/// # Errors
/// - `InvalidMaxSpeed` if `max_speed_ms` is not positive and finite.
/// - `NonFiniteInput` if any state is not finite. The states are left
///   unmodified.
pub fn desaturate_wheel_speeds(
    states: &mut [ModuleState; NUM_MODULES],
    max_speed_ms: f64,
) -> Result<f64, KinematicsError> {
    check_max_speed(max_speed_ms)?;
    check_states(states)?;

    let real_max_ms = max_abs_speed(states);

    if real_max_ms <= max_speed_ms {
        return Ok(1.0);
    }

    let factor = max_speed_ms / real_max_ms;
    scale(states, factor);

    Ok(factor)
}

/// Desaturate module speeds taking the chassis' attainable translation and
/// rotation rates into account as well as the module limit.
///
/// The chassis speeds are the (robot-relative) speeds the states were
/// generated from. The commanded motion is expressed as a fraction of what
/// the chassis can attain in translation and in rotation, and the module
/// speeds are scaled so the fastest module runs at that fraction of the
/// module limit. As with `desaturate_wheel_speeds` speeds are never
/// increased.
///
/// Returns the factor applied.
pub fn desaturate_with_limits(
    states: &mut [ModuleState; NUM_MODULES],
    chassis: ChassisSpeeds,
    max_module_speed_ms: f64,
    max_translation_ms: f64,
    max_rotation_rads: f64,
) -> Result<f64, KinematicsError> {
    check_max_speed(max_module_speed_ms)?;
    check_max_speed(max_translation_ms)?;
    check_max_speed(max_rotation_rads)?;
    check_states(states)?;
    if !chassis.is_finite() {
        return Err(KinematicsError::NonFiniteInput);
    }

    let real_max_ms = max_abs_speed(states);
    if real_max_ms == 0.0 {
        return Ok(1.0);
    }

    let translational_k = chassis.vx_ms.hypot(chassis.vy_ms) / max_translation_ms;
    let rotational_k = chassis.omega_rads.abs() / max_rotation_rads;
    let k = translational_k.max(rotational_k);

    let factor = (k * max_module_speed_ms / real_max_ms).min(1.0);
    scale(states, factor);

    Ok(factor)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn check_max_speed(max: f64) -> Result<(), KinematicsError> {
    if max.is_finite() && max > 0.0 {
        Ok(())
    } else {
        Err(KinematicsError::InvalidMaxSpeed(max))
    }
}

fn check_states(states: &[ModuleState; NUM_MODULES]) -> Result<(), KinematicsError> {
    if states.iter().all(|s| s.is_finite()) {
        Ok(())
    } else {
        Err(KinematicsError::NonFiniteInput)
    }
}

fn max_abs_speed(states: &[ModuleState; NUM_MODULES]) -> f64 {
    states
        .iter()
        .map(|s| s.speed_ms.abs())
        .fold(0.0, f64::max)
}

fn scale(states: &mut [ModuleState; NUM_MODULES], factor: f64) {
    for s in states.iter_mut() {
        s.speed_ms *= factor;
    }
}
