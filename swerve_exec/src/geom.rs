//! # Planar geometry types
//!
//! Rotations, poses and twists in the plane. All angles are stored in the
//! canonical range (-pi, pi], and every operation that produces an angle
//! renormalises it, so `170 deg - (-170 deg)` is `-20 deg` rather than
//! `340 deg`.
//!
//! Frames: the robot body frame has +X forward and +Y to the left, the field
//! frame is fixed to the arena. Headings are anticlockwise from field +X.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

// Internal
use util::maths::wrap_pi;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Below this angle (radians) the SE(2) exponential and logarithm use their
/// Taylor expansions.
const SMALL_ANGLE_RAD: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A planar rotation, held in the range (-pi, pi].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Rotation {
    rad: f64,
}

/// A pose in the plane: a position and a heading.
///
/// Units: meters, radians
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose2d {
    /// Position of the robot centre in the field frame.
    pub position_m: Vector2<f64>,

    /// Heading of the robot body +X axis relative to the field +X axis.
    pub heading: Rotation,
}

/// A change in pose along a constant-curvature arc, expressed in the frame of
/// the starting pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist2d {
    /// Forward displacement.
    ///
    /// Units: meters
    pub dx_m: f64,

    /// Leftward displacement.
    ///
    /// Units: meters
    pub dy_m: f64,

    /// Heading change.
    ///
    /// Units: radians
    pub dtheta_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Rotation {
    /// Create a rotation from an angle in radians.
    pub fn from_rad(rad: f64) -> Self {
        Self { rad: wrap_pi(rad) }
    }

    /// Create a rotation from an angle in degrees.
    pub fn from_deg(deg: f64) -> Self {
        Self::from_rad(deg.to_radians())
    }

    /// Create a rotation pointing along the vector `(x, y)`.
    ///
    /// The zero vector gives a zero rotation.
    pub fn from_xy(x: f64, y: f64) -> Self {
        Self::from_rad(y.atan2(x))
    }

    /// The angle in radians, in (-pi, pi].
    pub fn rad(&self) -> f64 {
        self.rad
    }

    /// The angle in degrees, in (-180, 180].
    pub fn deg(&self) -> f64 {
        self.rad.to_degrees()
    }

    pub fn cos(&self) -> f64 {
        self.rad.cos()
    }

    pub fn sin(&self) -> f64 {
        self.rad.sin()
    }

    /// Compose this rotation with another.
    pub fn rotate_by(self, other: Rotation) -> Self {
        self + other
    }

    /// Rotate a vector by this rotation.
    pub fn rotate_vec(&self, v: Vector2<f64>) -> Vector2<f64> {
        let (s, c) = self.rad.sin_cos();
        Vector2::new(c * v.x - s * v.y, s * v.x + c * v.y)
    }

    /// False if the angle is NaN. Construction maps infinities to NaN.
    pub fn is_finite(&self) -> bool {
        self.rad.is_finite()
    }
}

impl From<f64> for Rotation {
    fn from(rad: f64) -> Self {
        Self::from_rad(rad)
    }
}

impl From<Rotation> for f64 {
    fn from(r: Rotation) -> Self {
        r.rad
    }
}

impl Add for Rotation {
    type Output = Rotation;

    fn add(self, rhs: Rotation) -> Rotation {
        Rotation::from_rad(self.rad + rhs.rad)
    }
}

impl Sub for Rotation {
    type Output = Rotation;

    fn sub(self, rhs: Rotation) -> Rotation {
        Rotation::from_rad(self.rad - rhs.rad)
    }
}

impl Neg for Rotation {
    type Output = Rotation;

    fn neg(self) -> Rotation {
        Rotation::from_rad(-self.rad)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} deg", self.deg())
    }
}

impl Default for Pose2d {
    fn default() -> Self {
        Self {
            position_m: Vector2::zeros(),
            heading: Rotation::default(),
        }
    }
}

impl Pose2d {
    /// Construct a new pose.
    pub fn new(x_m: f64, y_m: f64, heading: Rotation) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading,
        }
    }

    /// Express `other` in the frame of this pose.
    pub fn relative_to(&self, other: &Pose2d) -> Pose2d {
        Pose2d {
            position_m: (-self.heading).rotate_vec(other.position_m - self.position_m),
            heading: other.heading - self.heading,
        }
    }

    /// Move along the given twist (the SE(2) exponential map).
    ///
    /// The twist is in this pose's frame and is integrated as a constant
    /// curvature arc rather than a straight line.
    pub fn exp(&self, twist: &Twist2d) -> Pose2d {
        let dtheta = twist.dtheta_rad;
        let (sin_theta, cos_theta) = dtheta.sin_cos();

        let (s, c) = if dtheta.abs() < SMALL_ANGLE_RAD {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin_theta / dtheta, (1.0 - cos_theta) / dtheta)
        };

        let delta_rb = Vector2::new(
            twist.dx_m * s - twist.dy_m * c,
            twist.dx_m * c + twist.dy_m * s,
        );

        Pose2d {
            position_m: self.position_m + self.heading.rotate_vec(delta_rb),
            heading: self.heading + Rotation::from_rad(dtheta),
        }
    }

    /// The twist which takes this pose to `end` (the SE(2) logarithm map).
    pub fn log(&self, end: &Pose2d) -> Twist2d {
        let transform = self.relative_to(end);
        let dtheta = transform.heading.rad();
        let half_dtheta = dtheta / 2.0;
        let cos_minus_one = transform.heading.cos() - 1.0;

        let half_theta_by_tan_half_dtheta = if cos_minus_one.abs() < SMALL_ANGLE_RAD {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * transform.heading.sin()) / cos_minus_one
        };

        // Rotate by atan2(-half_dtheta, k) and scale by hypot(k, half_dtheta),
        // written out as a complex multiply.
        let k = half_theta_by_tan_half_dtheta;
        let t = transform.position_m;

        Twist2d {
            dx_m: t.x * k + t.y * half_dtheta,
            dy_m: -t.x * half_dtheta + t.y * k,
            dtheta_rad: dtheta,
        }
    }
}

impl fmt::Display for Pose2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(x: {:.3} m, y: {:.3} m, heading: {})",
            self.position_m.x, self.position_m.y, self.heading
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    const EPS: f64 = 1e-9;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn test_rotation_wraps() {
        let a = Rotation::from_deg(170.0);
        let b = Rotation::from_deg(-170.0);

        // 340 deg is represented as -20 deg
        assert!(close((a - b).deg(), -20.0));
        assert!(close((a - b).deg().abs(), 20.0));
        assert!(close((b - a).deg(), 20.0));
        assert!(close((a + b).deg(), 0.0));

        assert!(close(Rotation::from_deg(180.0).deg(), 180.0));
        assert!(close(Rotation::from_deg(-180.0).deg(), 180.0));
        assert!(close(Rotation::from_deg(540.0).deg(), 180.0));
        assert!(close((-Rotation::from_deg(90.0)).deg(), -90.0));
    }

    #[test]
    fn test_rotation_nan() {
        assert!(!Rotation::from_rad(f64::NAN).is_finite());
        assert!(!Rotation::from_rad(f64::INFINITY).is_finite());
        assert!(Rotation::from_rad(1e6).is_finite());
    }

    #[test]
    fn test_rotate_vec() {
        let v = Rotation::from_deg(90.0).rotate_vec(Vector2::new(1.0, 0.0));
        assert!(close(v.x, 0.0));
        assert!(close(v.y, 1.0));
    }

    #[test]
    fn test_exp_straight_and_arc() {
        let start = Pose2d::new(1.0, 1.0, Rotation::from_rad(PI / 2.0));

        // Straight line forward in the body frame is +Y in the field frame
        let p = start.exp(&Twist2d { dx_m: 2.0, dy_m: 0.0, dtheta_rad: 0.0 });
        assert!(close(p.position_m.x, 1.0));
        assert!(close(p.position_m.y, 3.0));

        // Quarter circle of radius 1 from the origin ends at (1, 1)
        let p = Pose2d::default().exp(&Twist2d {
            dx_m: PI / 2.0,
            dy_m: 0.0,
            dtheta_rad: PI / 2.0,
        });
        assert!(close(p.position_m.x, 1.0));
        assert!(close(p.position_m.y, 1.0));
        assert!(close(p.heading.rad(), PI / 2.0));
    }

    #[test]
    fn test_log_inverts_exp() {
        let start = Pose2d::new(0.5, -0.25, Rotation::from_deg(30.0));
        let twist = Twist2d { dx_m: 0.4, dy_m: -0.1, dtheta_rad: 0.7 };

        let end = start.exp(&twist);
        let back = start.log(&end);

        assert!(close(back.dx_m, twist.dx_m));
        assert!(close(back.dy_m, twist.dy_m));
        assert!(close(back.dtheta_rad, twist.dtheta_rad));
    }
}
