//! # Drive scripts
//!
//! A drive script is a timed stream of commands, one per line:
//!
//! ```text
//! 0.0: {"type": "mode", "mode": "autonomous"};
//! 0.5: {"type": "drive", "vx_ms": 1.0, "vy_ms": 0.0, "omega_rads": 0.0, "field_relative": true};
//! 2.5: {"type": "stop"};
//! ```
//!
//! Times are in seconds from the start of the run, payloads are JSON. Lines
//! which don't match are ignored, so comments can be written freely.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

// Internal
use super::teleop::{Button, StickInput};
use super::RobotMode;
use crate::geom::{Pose2d, Rotation};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command which is scripted to occur at a specific time.
#[derive(Clone, Debug, PartialEq)]
struct Timed {
    exec_time_s: f64,
    cmd: DriveCmd,
}

/// A loaded drive script.
///
/// Use `pending` each cycle to get the commands which have become due.
pub struct DriveScript {
    path: PathBuf,
    cmds: VecDeque<Timed>,
    start_pose: Option<Pose2d>,
    duration_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Commands which can appear in a drive script.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriveCmd {
    /// Drive at the given chassis speeds (autonomous follower output).
    Drive {
        vx_ms: f64,
        vy_ms: f64,
        omega_rads: f64,
        #[serde(default)]
        field_relative: bool,
    },

    /// Raw gamepad stick values (teleop).
    Stick(StickInput),

    /// A gamepad button was released.
    Button { button: Button },

    /// Switch robot mode.
    Mode { mode: RobotMode },

    /// Set the pose estimate. The first one in a script is also the start
    /// pose used when entering autonomous.
    ResetPose {
        x_m: f64,
        y_m: f64,
        heading_deg: f64,
    },

    /// Stop driving.
    Stop,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error("Script contains an invalid timestamp: {0}. Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script contains an invalid command at {0} s: {1}")]
    InvalidCmd(f64, serde_json::Error),

    #[error("Could not build the script pattern: {0}")]
    Pattern(regex::Error),

    #[error("Script commands must be in time order, found {0} s after {1} s")]
    OutOfOrder(f64, f64),
}

/// Result of polling a script.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingCmds {
    None,
    Some(Vec<DriveCmd>),
    EndOfScript,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCmd {
    /// The pose of a `ResetPose` command.
    pub fn pose(&self) -> Option<Pose2d> {
        match self {
            DriveCmd::ResetPose {
                x_m,
                y_m,
                heading_deg,
            } => Some(Pose2d::new(*x_m, *y_m, Rotation::from_deg(*heading_deg))),
            _ => None,
        }
    }
}

impl DriveScript {
    /// Load a script from a file.
    pub fn load<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let path = PathBuf::from(script_path.as_ref());

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        let script = fs::read_to_string(&path).map_err(ScriptError::ScriptLoadError)?;

        let mut s = Self::from_str(&script)?;
        s.path = path;
        Ok(s)
    }

    /// Return the commands due at or before `time_s`, oldest first.
    pub fn pending(&mut self, time_s: f64) -> PendingCmds {
        if self.cmds.is_empty() {
            return PendingCmds::EndOfScript;
        }

        let mut due = Vec::new();
        while let Some(front) = self.cmds.front() {
            if front.exec_time_s > time_s {
                break;
            }
            if let Some(t) = self.cmds.pop_front() {
                due.push(t.cmd);
            }
        }

        if due.is_empty() {
            PendingCmds::None
        } else {
            PendingCmds::Some(due)
        }
    }

    /// The pose the script expects to start from, if it sets one.
    pub fn start_pose(&self) -> Option<Pose2d> {
        self.start_pose
    }

    /// The number of commands left to run.
    pub fn num_remaining(&self) -> usize {
        self.cmds.len()
    }

    /// The time of the last command.
    ///
    /// Units: seconds
    pub fn duration_s(&self) -> f64 {
        self.duration_s
    }

    /// The file the script was loaded from, empty if parsed from a string.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FromStr for DriveScript {
    type Err = ScriptError;

    /// Parse a script from a string.
    fn from_str(script: &str) -> Result<Self, Self::Err> {
        let re = RegexBuilder::new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .map_err(ScriptError::Pattern)?;

        let mut cmds: VecDeque<Timed> = VecDeque::new();
        let mut last_time_s = 0.0;

        for cap in re.captures_iter(script) {
            let (time_str, payload) = match (cap.get(1), cap.get(3)) {
                (Some(t), Some(p)) => (t.as_str(), p.as_str()),
                _ => continue,
            };

            let exec_time_s: f64 = time_str
                .parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            if exec_time_s < last_time_s {
                return Err(ScriptError::OutOfOrder(exec_time_s, last_time_s));
            }
            last_time_s = exec_time_s;

            let cmd: DriveCmd = serde_json::from_str(payload)
                .map_err(|e| ScriptError::InvalidCmd(exec_time_s, e))?;

            cmds.push_back(Timed { exec_time_s, cmd });
        }

        if cmds.is_empty() {
            return Err(ScriptError::ScriptEmpty);
        }

        let start_pose = cmds.iter().find_map(|t| t.cmd.pose());

        Ok(Self {
            path: PathBuf::new(),
            cmds,
            start_pose,
            duration_s: last_time_s,
        })
    }
}
