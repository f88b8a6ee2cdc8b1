//! Teleoperation input shaping and button bindings
//!
//! Raw stick axes are inverted, deadbanded and slew rate limited, then
//! scaled by the drivetrain's maximum chassis speed and rate. Buttons are
//! bound to actions once, when the parameters are loaded.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use serde::Deserialize;

// Internal
use super::{positive, ParamsError};
use crate::kinematics::ChassisSpeeds;
use util::maths::clamp;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of bindable buttons.
const NUM_BUTTONS: usize = 9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for teleoperation.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Params {
    /// Axis values with a magnitude below this are treated as zero.
    #[serde(default = "default_deadband")]
    pub deadband: f64,

    /// Maximum rate of change of a normalised axis value.
    ///
    /// Units: 1/second
    pub slew_rate_per_s: f64,

    /// Speed scale applied while slow mode is on.
    pub slow_scale: f64,

    /// Drive field-relative (true) or robot-relative (false).
    #[serde(default = "default_true")]
    pub field_relative: bool,

    /// Invert the forward axis. Gamepads report forward as negative.
    #[serde(default = "default_true")]
    pub invert_forward: bool,

    /// Invert the strafe axis. Gamepads report right as positive.
    #[serde(default = "default_true")]
    pub invert_strafe: bool,

    /// Invert the rotate axis. Gamepads report right as positive.
    #[serde(default = "default_true")]
    pub invert_rotate: bool,

    /// The action bound to each button.
    #[serde(default)]
    pub buttons: ButtonMap,
}

/// Button to action bindings as written in the parameter file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ButtonMap {
    pub start: Option<Action>,
    pub a: Option<Action>,
    pub b: Option<Action>,
    pub x: Option<Action>,
    pub y: Option<Action>,
    pub left_bumper: Option<Action>,
    pub right_bumper: Option<Action>,
    pub left_stick: Option<Action>,
    pub right_stick: Option<Action>,
}

/// Normalised stick axes, each in [-1, 1], as reported by the gamepad.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct StickInput {
    pub forward: f64,
    pub strafe: f64,
    pub rotate: f64,
}

/// Limits the rate of change of a signal.
#[derive(Clone, Copy, Debug)]
pub struct SlewRateLimiter {
    rate_per_s: f64,
    prev: f64,
}

/// Teleoperation state.
pub struct Teleop {
    params: Params,
    bindings: [Option<Action>; NUM_BUTTONS],

    forward_limiter: SlewRateLimiter,
    strafe_limiter: SlewRateLimiter,
    rotate_limiter: SlewRateLimiter,

    slow: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Gamepad buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Start,
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    LeftStick,
    RightStick,
}

/// Actions which can be bound to a button.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Make the current heading field-relative forward.
    ZeroHeading,

    /// Toggle slow mode.
    SlowMode,

    /// Leave slow mode and reset the slew rate limiters.
    ResetSpeed,

    /// Reset the pose estimate to the origin.
    ResetPose,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the shaping parameters keep the axes in [-1, 1].
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.deadband >= 0.0 && self.deadband < 1.0) {
            return Err(ParamsError::InvalidParam {
                name: "deadband",
                value: self.deadband,
            });
        }

        positive("slew_rate_per_s", self.slew_rate_per_s)?;

        if !(self.slow_scale > 0.0 && self.slow_scale <= 1.0) {
            return Err(ParamsError::InvalidParam {
                name: "slow_scale",
                value: self.slow_scale,
            });
        }

        Ok(())
    }
}

impl Button {
    fn index(self) -> usize {
        match self {
            Button::Start => 0,
            Button::A => 1,
            Button::B => 2,
            Button::X => 3,
            Button::Y => 4,
            Button::LeftBumper => 5,
            Button::RightBumper => 6,
            Button::LeftStick => 7,
            Button::RightStick => 8,
        }
    }
}

impl SlewRateLimiter {
    pub fn new(rate_per_s: f64) -> Self {
        Self {
            rate_per_s,
            prev: 0.0,
        }
    }

    /// Move towards `input` by at most `rate * dt_s`.
    pub fn calculate(&mut self, input: f64, dt_s: f64) -> f64 {
        let max_step = self.rate_per_s * dt_s;
        self.prev += clamp(&(input - self.prev), &-max_step, &max_step);
        self.prev
    }

    /// Jump straight to `value`.
    pub fn reset(&mut self, value: f64) {
        self.prev = value;
    }
}

impl Teleop {
    /// Create the teleop state, resolving the button bindings.
    pub fn new(params: Params) -> Self {
        let b = &params.buttons;
        let bindings = [
            b.start,
            b.a,
            b.b,
            b.x,
            b.y,
            b.left_bumper,
            b.right_bumper,
            b.left_stick,
            b.right_stick,
        ];

        let rate = params.slew_rate_per_s;

        Self {
            params,
            bindings,
            forward_limiter: SlewRateLimiter::new(rate),
            strafe_limiter: SlewRateLimiter::new(rate),
            rotate_limiter: SlewRateLimiter::new(rate),
            slow: false,
        }
    }

    /// True if driving field-relative.
    pub fn field_relative(&self) -> bool {
        self.params.field_relative
    }

    /// True if slow mode is on.
    pub fn is_slow(&self) -> bool {
        self.slow
    }

    /// Shape the stick input into chassis speeds.
    pub fn shape(
        &mut self,
        stick: StickInput,
        dt_s: f64,
        max_speed_ms: f64,
        max_rate_rads: f64,
    ) -> ChassisSpeeds {
        let p = &self.params;

        let forward = self
            .forward_limiter
            .calculate(apply_deadband(invert(stick.forward, p.invert_forward), p.deadband), dt_s);
        let strafe = self
            .strafe_limiter
            .calculate(apply_deadband(invert(stick.strafe, p.invert_strafe), p.deadband), dt_s);
        let rotate = self
            .rotate_limiter
            .calculate(apply_deadband(invert(stick.rotate, p.invert_rotate), p.deadband), dt_s);

        let scale = if self.slow { p.slow_scale } else { 1.0 };

        ChassisSpeeds::new(
            forward * max_speed_ms * scale,
            strafe * max_speed_ms * scale,
            rotate * max_rate_rads * scale,
        )
    }

    /// Handle a button release.
    ///
    /// Speed related actions are handled here, the rest are returned for the
    /// caller to carry out.
    pub fn press(&mut self, button: Button) -> Option<Action> {
        let action = self.bindings[button.index()]?;

        debug!("Button {:?} -> {:?}", button, action);

        match action {
            Action::SlowMode => {
                self.slow = !self.slow;
                info!("Slow mode {}", if self.slow { "on" } else { "off" });
            }
            Action::ResetSpeed => self.reset(),
            Action::ZeroHeading | Action::ResetPose => (),
        }

        Some(action)
    }

    /// Leave slow mode and zero the slew rate limiters.
    pub fn reset(&mut self) {
        self.slow = false;
        self.forward_limiter.reset(0.0);
        self.strafe_limiter.reset(0.0);
        self.rotate_limiter.reset(0.0);
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Zero values within `deadband` of zero, rescaling the rest so the output
/// still spans [-1, 1].
pub fn apply_deadband(value: f64, deadband: f64) -> f64 {
    if value.abs() <= deadband {
        0.0
    } else {
        value.signum() * util::maths::lin_map((deadband, 1.0), (0.0, 1.0), value.abs())
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn invert(value: f64, inverted: bool) -> f64 {
    if inverted {
        -value
    } else {
        value
    }
}

fn default_deadband() -> f64 {
    0.02
}

fn default_true() -> bool {
    true
}
