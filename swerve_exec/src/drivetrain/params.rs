//! Parameters structure for the drivetrain

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::Deserialize;

use super::DrivetrainError;
use crate::kinematics::NUM_MODULES;
use crate::module_ctrl;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the drivetrain.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Params {
    // ---- GEOMETRY ----

    /// Offset of each module from the robot centre, in FL, FR, RL, RR order.
    ///
    /// Units: meters,
    /// Frame: Robot body (+X forward, +Y left)
    pub module_offsets_m_rb: [[f64; 2]; NUM_MODULES],

    // ---- CAPABILITIES ----

    /// Maximum chassis translation speed.
    ///
    /// Units: meters/second
    pub max_chassis_speed_ms: f64,

    /// Maximum chassis rotation rate.
    ///
    /// Units: radians/second
    pub max_chassis_rate_rads: f64,

    /// Maximum wheel ground speed of any module.
    ///
    /// Units: meters/second
    pub max_module_speed_ms: f64,

    // ---- BEHAVIOUR ----

    /// Correct robot-relative speeds for the skew caused by holding them
    /// over a whole period while rotating.
    #[serde(default = "default_true")]
    pub discretize: bool,

    /// How module speeds are brought within limits.
    #[serde(default)]
    pub desaturation: Desaturation,

    /// What to do with modules whose steering can't be read.
    #[serde(default)]
    pub stale_policy: StalePolicy,

    /// Parameters shared by all modules.
    pub module: module_ctrl::Params,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How the drivetrain treats a module that faulted on this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Command zero drive speed on the stale module.
    ZeroDrive,

    /// Leave the stale module's last command in place.
    Continue,
}

/// Desaturation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Desaturation {
    /// Scale so no module exceeds the module speed limit.
    ModuleLimit,

    /// Also scale to the fraction of the chassis translation or rotation
    /// limit being asked for.
    ChassisLimits,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters are physically meaningful.
    ///
    /// Geometry is checked when the kinematics is built.
    pub fn validate(&self) -> Result<(), DrivetrainError> {
        positive("max_chassis_speed_ms", self.max_chassis_speed_ms)?;
        positive("max_chassis_rate_rads", self.max_chassis_rate_rads)?;
        positive("max_module_speed_ms", self.max_module_speed_ms)?;

        self.module.validate().map_err(DrivetrainError::ModuleParams)
    }

    /// The module offsets as vectors.
    pub fn offsets(&self) -> [Vector2<f64>; NUM_MODULES] {
        let mut offsets = [Vector2::zeros(); NUM_MODULES];
        for (o, p) in offsets.iter_mut().zip(self.module_offsets_m_rb.iter()) {
            *o = Vector2::new(p[0], p[1]);
        }
        offsets
    }
}

impl Default for Desaturation {
    fn default() -> Self {
        Desaturation::ModuleLimit
    }
}

impl Default for StalePolicy {
    fn default() -> Self {
        StalePolicy::ZeroDrive
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn positive(name: &'static str, value: f64) -> Result<(), DrivetrainError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DrivetrainError::InvalidParam { name, value })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// A 0.6 m square robot.
    pub(crate) fn params() -> Params {
        Params {
            module_offsets_m_rb: [[0.3, 0.3], [0.3, -0.3], [-0.3, 0.3], [-0.3, -0.3]],
            max_chassis_speed_ms: 4.0,
            max_chassis_rate_rads: 6.0,
            max_module_speed_ms: 4.0,
            discretize: true,
            desaturation: Desaturation::ModuleLimit,
            stale_policy: StalePolicy::ZeroDrive,
            module: module_ctrl::Params::default(),
        }
    }

    #[test]
    fn test_load_from_toml() {
        let p: Params = util::params::from_str(
            r#"
            module_offsets_m_rb = [[0.3, 0.3], [0.3, -0.3], [-0.3, 0.3], [-0.3, -0.3]]
            max_chassis_speed_ms = 4.0
            max_chassis_rate_rads = 6.0
            max_module_speed_ms = 4.5
            stale_policy = "continue"

            [module]
            wheel_radius_m = 0.0508
            drive_gear_ratio = 8.143
            turn_gear_ratio = 21.43
            zero_speed_threshold_ms = 0.001

            [module.drive_gains]
            k_p = 0.01
            k_i = 0.0
            k_d = 0.0
            k_ff = 0.0137

            [module.turn_gains]
            k_p = 0.015
            k_i = 0.0
            k_d = 0.001
            "#,
        )
        .unwrap();

        assert!(p.validate().is_ok());
        assert!(p.discretize);
        assert_eq!(p.desaturation, Desaturation::ModuleLimit);
        assert_eq!(p.stale_policy, StalePolicy::Continue);
        assert_eq!(p.module.turn_gains.output_range, (-1.0, 1.0));
        assert_eq!(p.offsets()[3], Vector2::new(-0.3, -0.3));
    }

    #[test]
    fn test_validate() {
        let mut p = params();
        assert!(p.validate().is_ok());

        p.max_module_speed_ms = 0.0;
        assert!(matches!(
            p.validate(),
            Err(DrivetrainError::InvalidParam {
                name: "max_module_speed_ms",
                ..
            })
        ));

        let mut p = params();
        p.module.turn_gear_ratio = -1.0;
        assert!(matches!(p.validate(), Err(DrivetrainError::ModuleParams(_))));
    }
}
