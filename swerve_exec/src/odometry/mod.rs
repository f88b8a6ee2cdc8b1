//! # Odometry
//!
//! Dead reckoning of the robot's field pose from the module drive distances
//! and the gyro heading.
//!
//! Each update takes the change in every module's driven distance since the
//! previous update (at the module's current steering angle), solves for the
//! chassis twist which best explains them, replaces the twist's rotation
//! with the change in gyro heading and integrates it along an arc. The gyro
//! is authoritative for rotation: the pose heading is always the latest gyro
//! heading plus the offset fixed at the last reset.
//!
//! An `Odometry` can only be built from an initial heading, module snapshot
//! and pose, so there is no uninitialised state to guard against.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use std::sync::{Arc, Mutex};

// Internal
use crate::geom::{Pose2d, Rotation};
use crate::kinematics::{ModulePosition, SwerveKinematics, NUM_MODULES};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Field pose estimator.
pub struct Odometry {
    kinematics: SwerveKinematics,

    pose: Pose2d,

    /// Added to the gyro heading to give the pose heading.
    gyro_offset: Rotation,

    prev_heading: Rotation,
    prev_positions: [ModulePosition; NUM_MODULES],

    handle: PoseHandle,
}

/// A cloneable, thread safe view of the latest pose estimate.
///
/// Readers always see a whole pose from a single update.
#[derive(Clone, Debug, Default)]
pub struct PoseHandle {
    pose: Arc<Mutex<Pose2d>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Odometry {
    /// Start tracking from `initial_pose`, given the current gyro heading and
    /// module positions.
    pub fn new(
        kinematics: SwerveKinematics,
        heading: Rotation,
        positions: [ModulePosition; NUM_MODULES],
        initial_pose: Pose2d,
    ) -> Self {
        let handle = PoseHandle::default();
        handle.set(initial_pose);

        Self {
            kinematics,
            pose: initial_pose,
            gyro_offset: initial_pose.heading - heading,
            prev_heading: initial_pose.heading,
            prev_positions: positions,
            handle,
        }
    }

    /// Integrate the motion since the last update.
    pub fn update(
        &mut self,
        heading: Rotation,
        positions: &[ModulePosition; NUM_MODULES],
    ) -> Pose2d {
        let angle = heading + self.gyro_offset;

        let mut deltas = [ModulePosition::default(); NUM_MODULES];
        for ((d, curr), prev) in deltas
            .iter_mut()
            .zip(positions.iter())
            .zip(self.prev_positions.iter())
        {
            *d = ModulePosition::new(curr.distance_m - prev.distance_m, curr.angle);
        }

        let mut twist = self.kinematics.to_twist(&deltas);
        twist.dtheta_rad = (angle - self.prev_heading).rad();

        let new_pose = self.pose.exp(&twist);

        self.prev_positions = *positions;
        self.prev_heading = angle;
        self.pose = Pose2d {
            position_m: new_pose.position_m,
            heading: angle,
        };
        self.handle.set(self.pose);

        trace!("Odometry pose {}", self.pose);

        self.pose
    }

    /// Overwrite the pose estimate, re-seeding the module snapshot and the
    /// gyro offset.
    pub fn reset_position(
        &mut self,
        heading: Rotation,
        positions: &[ModulePosition; NUM_MODULES],
        pose: Pose2d,
    ) {
        self.pose = pose;
        self.gyro_offset = pose.heading - heading;
        self.prev_heading = pose.heading;
        self.prev_positions = *positions;
        self.handle.set(pose);

        debug!("Odometry reset to {}", pose);
    }

    /// Keep the pose heading continuous when the gyro's zero moves, e.g.
    /// after the gyro is re-zeroed.
    ///
    /// `before` and `after` are the gyro readings either side of the move.
    /// Rotation since the last update is still picked up by the next one.
    pub fn rebase_gyro(&mut self, before: Rotation, after: Rotation) {
        self.gyro_offset = self.gyro_offset + (before - after);

        debug!("Odometry gyro offset now {}", self.gyro_offset);
    }

    /// The current pose estimate.
    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    /// A handle other threads can read the pose through.
    pub fn handle(&self) -> PoseHandle {
        self.handle.clone()
    }
}

impl PoseHandle {
    /// Get the latest pose.
    pub fn get(&self) -> Pose2d {
        // A panicking writer can't leave a half written Pose2d, so a poisoned
        // lock still holds a whole pose.
        match self.pose.lock() {
            Ok(p) => *p,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set(&self, pose: Pose2d) {
        match self.pose.lock() {
            Ok(mut p) => *p = pose,
            Err(poisoned) => *poisoned.into_inner() = pose,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector2;
    use std::f64::consts::FRAC_PI_2;

    const EPS: f64 = 1e-9;

    fn kinematics() -> SwerveKinematics {
        SwerveKinematics::new([
            Vector2::new(0.3, 0.3),
            Vector2::new(0.3, -0.3),
            Vector2::new(-0.3, 0.3),
            Vector2::new(-0.3, -0.3),
        ])
        .unwrap()
    }

    fn positions(distance_m: f64, angle: Rotation) -> [ModulePosition; NUM_MODULES] {
        [ModulePosition::new(distance_m, angle); NUM_MODULES]
    }

    #[test]
    fn test_no_motion_after_reset() {
        let p0 = [
            ModulePosition::new(1.2, Rotation::from_deg(10.0)),
            ModulePosition::new(-0.4, Rotation::from_deg(-35.0)),
            ModulePosition::new(3.0, Rotation::from_deg(90.0)),
            ModulePosition::new(0.0, Rotation::from_deg(180.0)),
        ];
        let mut odom = Odometry::new(
            kinematics(),
            Rotation::from_deg(40.0),
            positions(0.0, Rotation::default()),
            Pose2d::new(5.0, 5.0, Rotation::from_deg(40.0)),
        );

        odom.reset_position(Rotation::default(), &p0, Pose2d::default());
        let pose = odom.update(Rotation::default(), &p0);

        assert_eq!(pose.position_m, Vector2::zeros());
        assert_eq!(pose.heading.rad(), 0.0);
    }

    #[test]
    fn test_straight_line() {
        let mut odom = Odometry::new(
            kinematics(),
            Rotation::default(),
            positions(0.0, Rotation::default()),
            Pose2d::default(),
        );

        // Modules pointing left, robot facing field +Y after a reset
        odom.reset_position(
            Rotation::default(),
            &positions(0.0, Rotation::from_deg(90.0)),
            Pose2d::new(1.0, 2.0, Rotation::from_rad(FRAC_PI_2)),
        );
        let pose = odom.update(Rotation::default(), &positions(0.5, Rotation::from_deg(90.0)));

        // Robot left is field -X
        assert!((pose.position_m.x - 0.5).abs() < EPS);
        assert!((pose.position_m.y - 2.0).abs() < EPS);
        assert!((pose.heading.rad() - FRAC_PI_2).abs() < EPS);
    }

    #[test]
    fn test_heading_follows_gyro() {
        let mut odom = Odometry::new(
            kinematics(),
            Rotation::from_deg(30.0),
            positions(0.0, Rotation::default()),
            Pose2d::default(),
        );

        // Gyro moved 15 degrees with no wheel motion
        let pose = odom.update(Rotation::from_deg(45.0), &positions(0.0, Rotation::default()));
        assert!((pose.heading.deg() - 15.0).abs() < EPS);
        assert!(pose.position_m.norm() < EPS);
    }

    #[test]
    fn test_rebase_gyro_keeps_heading() {
        let mut odom = Odometry::new(
            kinematics(),
            Rotation::from_deg(30.0),
            positions(0.0, Rotation::default()),
            Pose2d::new(0.0, 0.0, Rotation::from_deg(30.0)),
        );

        // Turned a further 20 degrees since the last update, then the gyro
        // is re-zeroed
        odom.rebase_gyro(Rotation::from_deg(50.0), Rotation::default());
        let pose = odom.update(Rotation::from_deg(10.0), &positions(0.0, Rotation::default()));

        assert!((pose.heading.deg() - 60.0).abs() < EPS);
    }

    #[test]
    fn test_handle_snapshot() {
        let mut odom = Odometry::new(
            kinematics(),
            Rotation::default(),
            positions(0.0, Rotation::default()),
            Pose2d::default(),
        );
        let handle = odom.handle();

        odom.update(Rotation::default(), &positions(0.25, Rotation::default()));

        let from_thread = std::thread::spawn(move || handle.get()).join().unwrap();
        assert_eq!(from_thread, odom.pose());
        assert!((from_thread.position_m.x - 0.25).abs() < EPS);
    }
}
