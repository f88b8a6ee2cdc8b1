//! Frame conversion and discretisation of chassis speeds

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;

use super::{ChassisSpeeds, KinematicsError};
use crate::geom::{Pose2d, Rotation};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ChassisSpeeds {
    /// Convert field-relative speeds into robot-relative speeds, given the
    /// robot's heading in the field.
    pub fn from_field_relative(field: ChassisSpeeds, heading: Rotation) -> ChassisSpeeds {
        let v = (-heading).rotate_vec(Vector2::new(field.vx_ms, field.vy_ms));

        ChassisSpeeds::new(v.x, v.y, field.omega_rads)
    }

    /// Convert robot-relative speeds into field-relative speeds, given the
    /// robot's heading in the field.
    pub fn to_field_relative(robot: ChassisSpeeds, heading: Rotation) -> ChassisSpeeds {
        let v = heading.rotate_vec(Vector2::new(robot.vx_ms, robot.vy_ms));

        ChassisSpeeds::new(v.x, v.y, robot.omega_rads)
    }

    /// Discretise robot-relative speeds held for `period_s`.
    ///
    /// Holding a robot-relative velocity constant while the robot rotates
    /// sweeps the translation along an arc, so the robot skews away from the
    /// requested direction. This finds the constant-curvature twist that ends
    /// at the pose reached by applying the translation and rotation
    /// "instantaneously" over the period, and returns that twist as a
    /// velocity.
    ///
    /// With zero rotation the speeds are returned unchanged.
    pub fn discretize(
        speeds: ChassisSpeeds,
        period_s: f64,
    ) -> Result<ChassisSpeeds, KinematicsError> {
        if !(period_s.is_finite() && period_s > 0.0) {
            return Err(KinematicsError::InvalidPeriod(period_s));
        }
        if !speeds.is_finite() {
            return Err(KinematicsError::NonFiniteInput);
        }

        let desired_delta = Pose2d::new(
            speeds.vx_ms * period_s,
            speeds.vy_ms * period_s,
            Rotation::from_rad(speeds.omega_rads * period_s),
        );

        let twist = Pose2d::default().log(&desired_delta);

        // The twist's heading change is wrapped, so use the requested rate
        // directly to keep rotations over half a turn per period intact.
        Ok(ChassisSpeeds::new(
            twist.dx_m / period_s,
            twist.dy_m / period_s,
            speeds.omega_rads,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_frame_conversion() {
        // Robot facing field +Y, field +X motion is robot rightward (-Y)
        let robot = ChassisSpeeds::from_field_relative(
            ChassisSpeeds::new(1.0, 0.0, 0.5),
            Rotation::from_deg(90.0),
        );
        assert!((robot.vx_ms - 0.0).abs() < EPS);
        assert!((robot.vy_ms + 1.0).abs() < EPS);
        assert_eq!(robot.omega_rads, 0.5);

        let field = ChassisSpeeds::to_field_relative(robot, Rotation::from_deg(90.0));
        assert!((field.vx_ms - 1.0).abs() < EPS);
        assert!((field.vy_ms - 0.0).abs() < EPS);
    }

    #[test]
    fn test_discretize_no_rotation_is_identity() {
        let s = ChassisSpeeds::new(1.5, -0.5, 0.0);
        let d = ChassisSpeeds::discretize(s, 0.02).unwrap();

        assert!((d.vx_ms - s.vx_ms).abs() < EPS);
        assert!((d.vy_ms - s.vy_ms).abs() < EPS);
        assert_eq!(d.omega_rads, 0.0);
    }

    #[test]
    fn test_discretize_lands_on_target() {
        // Integrating the discretised twist over one period must reach the
        // pose the raw speeds asked for.
        let s = ChassisSpeeds::new(2.0, 0.0, PI);
        let period_s = 0.1;
        let d = ChassisSpeeds::discretize(s, period_s).unwrap();

        let end = Pose2d::default().exp(&crate::geom::Twist2d {
            dx_m: d.vx_ms * period_s,
            dy_m: d.vy_ms * period_s,
            dtheta_rad: d.omega_rads * period_s,
        });

        assert!((end.position_m.x - 0.2).abs() < 1e-9);
        assert!(end.position_m.y.abs() < 1e-9);

        // The correction adds a sideways component opposing the skew
        assert!(d.vy_ms < 0.0);
    }

    #[test]
    fn test_discretize_rejects_bad_period() {
        let s = ChassisSpeeds::new(1.0, 0.0, 1.0);

        assert_eq!(
            ChassisSpeeds::discretize(s, 0.0),
            Err(KinematicsError::InvalidPeriod(0.0))
        );
        assert!(ChassisSpeeds::discretize(s, -0.02).is_err());
        assert_eq!(
            ChassisSpeeds::discretize(ChassisSpeeds::new(f64::NAN, 0.0, 0.0), 0.02),
            Err(KinematicsError::NonFiniteInput)
        );
    }
}
