//! Forward and inverse swerve kinematics

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix3, Vector2, Vector3};

// Internal
use super::{
    ChassisSpeeds, KinematicsError, ModulePosition, ModuleSlot, ModuleState, NUM_MODULES,
};
use crate::geom::{Rotation, Twist2d};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Determinant of the normal matrix below which a layout is considered
/// degenerate.
///
/// Units: meters^4
const MIN_NORMAL_DET: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Kinematics for a four module swerve drive.
///
/// For module `i` at offset `(x_i, y_i)` from the centre the module velocity
/// is
///
/// ```text
/// [v_ix]   [1  0  -y_i] [vx   ]
/// [v_iy] = [0  1   x_i] [vy   ]
///                       [omega]
/// ```
///
/// Stacking all four gives `A` (8x3). The inverse uses `(A^T A)^-1 A^T`,
/// where `(A^T A)^-1` is computed once here.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    /// Module offsets from the robot centre, in `ModuleSlot::ALL` order.
    ///
    /// Units: meters,
    /// Frame: Robot body
    offsets_m_rb: [Vector2<f64>; NUM_MODULES],

    /// Inverse of the normal matrix `A^T A`.
    normal_inv: Matrix3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SwerveKinematics {
    /// Build the kinematics for the given module offsets.
    ///
    /// # Errors
    /// - `NonFiniteOffset` if any offset contains NaN or infinity.
    /// - `DegenerateGeometry` if the layout cannot resolve rotation from
    ///   translation, e.g. all modules at the same point.
    pub fn new(offsets_m_rb: [Vector2<f64>; NUM_MODULES]) -> Result<Self, KinematicsError> {
        for (slot, offset) in ModuleSlot::ALL.iter().zip(offsets_m_rb.iter()) {
            if !(offset.x.is_finite() && offset.y.is_finite()) {
                return Err(KinematicsError::NonFiniteOffset(*slot));
            }
        }

        // Accumulate A^T A from each module's pair of rows
        let mut normal = Matrix3::zeros();
        for r in offsets_m_rb.iter() {
            normal += Matrix3::new(
                1.0, 0.0, -r.y,
                0.0, 1.0, r.x,
                -r.y, r.x, r.x * r.x + r.y * r.y,
            );
        }

        if normal.determinant().abs() < MIN_NORMAL_DET {
            return Err(KinematicsError::DegenerateGeometry);
        }

        let normal_inv = normal
            .try_inverse()
            .ok_or(KinematicsError::DegenerateGeometry)?;

        Ok(Self {
            offsets_m_rb,
            normal_inv,
        })
    }

    /// Get the module offsets.
    pub fn offsets(&self) -> &[Vector2<f64>; NUM_MODULES] {
        &self.offsets_m_rb
    }

    /// Calculate the module states needed to achieve the robot-relative
    /// chassis speeds, rotating about the robot centre.
    ///
    /// A module with zero velocity gets a zero angle; callers that steer
    /// modules should hold the previous angle in that case.
    pub fn to_module_states(&self, speeds: ChassisSpeeds) -> [ModuleState; NUM_MODULES] {
        self.to_module_states_about(speeds, Vector2::zeros())
    }

    /// Calculate the module states needed to achieve the robot-relative
    /// chassis speeds, rotating about `centre_m_rb`.
    pub fn to_module_states_about(
        &self,
        speeds: ChassisSpeeds,
        centre_m_rb: Vector2<f64>,
    ) -> [ModuleState; NUM_MODULES] {
        let mut states = [ModuleState::default(); NUM_MODULES];

        for (state, offset) in states.iter_mut().zip(self.offsets_m_rb.iter()) {
            let r = offset - centre_m_rb;
            let v = Vector2::new(
                speeds.vx_ms - speeds.omega_rads * r.y,
                speeds.vy_ms + speeds.omega_rads * r.x,
            );

            *state = ModuleState::new(v.norm(), Rotation::from_xy(v.x, v.y));
        }

        states
    }

    /// Recover the robot-relative chassis speeds which best explain the given
    /// module states (least squares).
    pub fn to_chassis_speeds(&self, states: &[ModuleState; NUM_MODULES]) -> ChassisSpeeds {
        let mut vectors = [Vector2::zeros(); NUM_MODULES];
        for (v, s) in vectors.iter_mut().zip(states.iter()) {
            *v = Vector2::new(s.speed_ms * s.angle.cos(), s.speed_ms * s.angle.sin());
        }

        let x = self.solve(&vectors);

        ChassisSpeeds::new(x[0], x[1], x[2])
    }

    /// Recover the robot-relative twist which best explains the given module
    /// distance deltas (least squares).
    ///
    /// Each delta's distance is the change in driven distance since the last
    /// call and its angle is the module's current steering angle.
    pub fn to_twist(&self, deltas: &[ModulePosition; NUM_MODULES]) -> Twist2d {
        let mut vectors = [Vector2::zeros(); NUM_MODULES];
        for (v, d) in vectors.iter_mut().zip(deltas.iter()) {
            *v = Vector2::new(d.distance_m * d.angle.cos(), d.distance_m * d.angle.sin());
        }

        let x = self.solve(&vectors);

        Twist2d {
            dx_m: x[0],
            dy_m: x[1],
            dtheta_rad: x[2],
        }
    }

    /// Solve `A x = b` for `x` in the least squares sense, where `b` is the
    /// stacked module vectors.
    fn solve(&self, vectors: &[Vector2<f64>; NUM_MODULES]) -> Vector3<f64> {
        // A^T b
        let mut atb = Vector3::zeros();
        for (r, v) in self.offsets_m_rb.iter().zip(vectors.iter()) {
            atb += Vector3::new(v.x, v.y, -r.y * v.x + r.x * v.y);
        }

        self.normal_inv * atb
    }
}
