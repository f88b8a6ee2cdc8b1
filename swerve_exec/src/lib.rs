//! # Swerve drivetrain library.
//!
//! This library allows the executable, benchmarks and other crates in the
//! workspace to access the drivetrain control core.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Control loop driver - runs one tick of mode handling, drive and safe mode
/// monitoring, fed by teleop input or a drive script
pub mod driver;

/// Drivetrain coordinator - owns the four modules, the gyro and the odometry
pub mod drivetrain;

/// Fault classification shared by all error types
pub mod fault;

/// Planar geometry - rotations, poses and twists
pub mod geom;

/// Hardware abstraction layer - the actuator and sensor traits
pub mod hal;

/// Swerve kinematics - chassis speeds to module states and back
pub mod kinematics;

/// Module control - steers and drives a single swerve module
pub mod module_ctrl;

/// Odometry - integrates module travel and gyro heading into a pose
pub mod odometry;
