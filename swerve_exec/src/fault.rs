//! Fault classification shared by the drivetrain components

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The broad class of a fault, which decides how it is handled.
///
/// - `Configuration` faults are fatal at construction.
/// - `Sensor` faults mark the affected module (or the gyro) stale for the
///   tick.
/// - `Actuator` faults drop that actuator's command for the tick, the next
///   tick retries naturally.
/// - `NumericDegenerate` faults are rejected before any hardware write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FaultKind {
    Configuration,
    Sensor,
    Actuator,
    NumericDegenerate,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultKind::Configuration => "configuration",
            FaultKind::Sensor => "sensor",
            FaultKind::Actuator => "actuator",
            FaultKind::NumericDegenerate => "numeric",
        };
        write!(f, "{}", s)
    }
}
