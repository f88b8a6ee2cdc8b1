//! Parameters structure for a swerve module

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::ModuleError;
use crate::hal::PidGains;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters shared by all four swerve modules.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Params {
    // ---- GEOMETRY ----

    /// The radius of the drive wheel.
    ///
    /// Units: meters
    pub wheel_radius_m: f64,

    /// Motor shaft turns per wheel turn for the drive motor.
    pub drive_gear_ratio: f64,

    /// Motor shaft turns per steering turn for the turn motor.
    pub turn_gear_ratio: f64,

    // ---- CONTROL ----

    /// Gains for the drive motor's velocity loop.
    pub drive_gains: PidGains,

    /// Gains for the turn motor's position loop.
    pub turn_gains: PidGains,

    /// Demanded speeds with a magnitude below this are treated as zero, the
    /// module then holds its previous steering angle.
    ///
    /// Units: meters/second
    pub zero_speed_threshold_ms: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters are physically meaningful.
    pub fn validate(&self) -> Result<(), ModuleError> {
        positive("wheel_radius_m", self.wheel_radius_m)?;
        positive("drive_gear_ratio", self.drive_gear_ratio)?;
        positive("turn_gear_ratio", self.turn_gear_ratio)?;

        if !(self.zero_speed_threshold_ms.is_finite() && self.zero_speed_threshold_ms >= 0.0) {
            return Err(ModuleError::InvalidParam {
                name: "zero_speed_threshold_ms",
                value: self.zero_speed_threshold_ms,
            });
        }

        Ok(())
    }

    /// Convert a wheel ground speed into a drive motor shaft rate.
    pub fn speed_to_motor_rads(&self, speed_ms: f64) -> f64 {
        speed_ms / self.wheel_radius_m * self.drive_gear_ratio
    }

    /// Convert a drive motor shaft rate into a wheel ground speed.
    pub fn motor_rads_to_speed(&self, motor_rads: f64) -> f64 {
        motor_rads / self.drive_gear_ratio * self.wheel_radius_m
    }
}

impl Default for Params {
    /// A 2 inch wheel on a typical COTS module.
    fn default() -> Self {
        Self {
            wheel_radius_m: 0.0508,
            drive_gear_ratio: 8.143,
            turn_gear_ratio: 21.43,
            drive_gains: PidGains {
                k_p: 0.01,
                k_i: 0.0,
                k_d: 0.0,
                k_ff: 1.0 / 73.0,
                output_range: (-1.0, 1.0),
            },
            turn_gains: PidGains {
                k_p: 0.015,
                k_i: 0.0,
                k_d: 0.001,
                k_ff: 0.0,
                output_range: (-1.0, 1.0),
            },
            zero_speed_threshold_ms: 1e-3,
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn positive(name: &'static str, value: f64) -> Result<(), ModuleError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ModuleError::InvalidParam { name, value })
    }
}
