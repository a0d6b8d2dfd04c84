//! Wire commands understood by the LVP processors.
//!
//! Every command is a fixed 13-byte frame:
//!
//! ```text
//! [opcode, serial number, subopcode, param1, param2, 0, 0, 0, 0, 0, 0, 0, terminator]
//! ```
//!
//! The device never answers, so a frame is all there is to the protocol.

use crate::options::{OptionValue, ResolvedOptions};

pub const COMMAND_LEN: usize = 13;
pub const OPCODE: u8 = 0x05;
pub const TERMINATOR: u8 = 0x05;

pub const SUBOP_INPUT_SWITCH: u8 = 0x00;
pub const SUBOP_BRIGHTNESS: u8 = 0x10;

pub const MAX_FADE_TIME: u8 = 3;
pub const MAX_INPUT_SOURCE: u8 = 8;
/// Some units only go up to 64; which one applies is up to the caller.
pub const MAX_BRIGHTNESS: u8 = 100;

const FADE_KEYS: &[&str] = &["fadeTime", "fade"];
const INPUT_KEYS: &[&str] = &["inputSource", "input"];
const LEVEL_KEYS: &[&str] = &["level", "value"];

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("{name} must be between {min} and {max}, got {value}")]
    ParameterOutOfRange {
        name: &'static str,
        value: i64,
        min: u8,
        max: u8,
    },
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("{name} is not an integer: {value}")]
    InvalidParameter { name: &'static str, value: String },
}

fn check_range(name: &'static str, value: i64, max: u8) -> Result<u8, EncodeError> {
    if (0..=i64::from(max)).contains(&value) {
        Ok(value as u8)
    } else {
        Err(EncodeError::ParameterOutOfRange {
            name,
            value,
            min: 0,
            max,
        })
    }
}

/// Crossfade duration in half-second steps, 0 (cut) to 3 (1.5s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeTime(u8);

impl FadeTime {
    pub fn new(steps: i64) -> Result<Self, EncodeError> {
        check_range("fadeTime", steps, MAX_FADE_TIME).map(Self)
    }

    pub fn steps(self) -> u8 {
        self.0
    }

    pub fn millis(self) -> u32 {
        u32::from(self.0) * 500
    }
}

/// Video input of the processor, 0 to 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSource(u8);

impl InputSource {
    pub const NAMES: [&'static str; 9] = [
        "V1", "V2", "VGA1", "VGA2", "HDMI", "DVI", "DP", "EXT", "YPBPR",
    ];

    pub fn new(id: i64) -> Result<Self, EncodeError> {
        check_range("inputSource", id, MAX_INPUT_SOURCE).map(Self)
    }

    /// Looks an input up by its front-panel label, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| Self(i as u8))
    }

    pub fn id(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[usize::from(self.0)]
    }
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level(u8);

impl Level {
    pub fn new(level: i64) -> Result<Self, EncodeError> {
        check_range("level", level, MAX_BRIGHTNESS).map(Self)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    InputSwitch,
    Brightness,
}

impl ActionKind {
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::InputSwitch => "InputSwitch",
            ActionKind::Brightness => "Brightness",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InputSwitch" => Ok(ActionKind::InputSwitch),
            "Brightness" => Ok(ActionKind::Brightness),
            other => Err(EncodeError::UnknownAction(other.to_string())),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An action with its parameters already validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    InputSwitch { fade: FadeTime, input: InputSource },
    Brightness { level: Level },
}

fn integer_param(
    options: &ResolvedOptions,
    name: &'static str,
    keys: &[&str],
) -> Result<i64, EncodeError> {
    let value = options
        .get_any(keys)
        .ok_or(EncodeError::MissingParameter(name))?;

    value.as_integer().ok_or_else(|| EncodeError::InvalidParameter {
        name,
        value: match value {
            OptionValue::Text(s) => s.clone(),
            OptionValue::Number(n) => n.to_string(),
        },
    })
}

impl Action {
    pub fn input_switch(fade: i64, input: i64) -> Result<Self, EncodeError> {
        Ok(Action::InputSwitch {
            fade: FadeTime::new(fade)?,
            input: InputSource::new(input)?,
        })
    }

    pub fn brightness(level: i64) -> Result<Self, EncodeError> {
        Ok(Action::Brightness {
            level: Level::new(level)?,
        })
    }

    /// Builds an action from resolved options. Both the descriptive keys
    /// (`fadeTime`, `inputSource`, `level`) and the short option ids
    /// (`fade`, `input`, `value`) are accepted.
    pub fn from_options(kind: ActionKind, options: &ResolvedOptions) -> Result<Self, EncodeError> {
        match kind {
            ActionKind::InputSwitch => Self::input_switch(
                integer_param(options, "fadeTime", FADE_KEYS)?,
                integer_param(options, "inputSource", INPUT_KEYS)?,
            ),
            ActionKind::Brightness => {
                Self::brightness(integer_param(options, "level", LEVEL_KEYS)?)
            }
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::InputSwitch { .. } => ActionKind::InputSwitch,
            Action::Brightness { .. } => ActionKind::Brightness,
        }
    }

    pub fn encode(&self, serial_number: u8) -> Command {
        match *self {
            Action::InputSwitch { fade, input } => Command::new(
                serial_number,
                SUBOP_INPUT_SWITCH,
                fade.steps(),
                input.id(),
            ),
            Action::Brightness { level } => {
                Command::new(serial_number, SUBOP_BRIGHTNESS, level.value(), 0)
            }
        }
    }
}

/// Looks up `action_name`, validates `params` and builds the frame.
pub fn encode(
    action_name: &str,
    params: &ResolvedOptions,
    serial_number: u8,
) -> Result<Command, EncodeError> {
    let kind: ActionKind = action_name.parse()?;
    Ok(Action::from_options(kind, params)?.encode(serial_number))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command([u8; COMMAND_LEN]);

impl Command {
    fn new(serial_number: u8, subopcode: u8, param1: u8, param2: u8) -> Self {
        let mut frame = [0u8; COMMAND_LEN];
        frame[0] = OPCODE;
        frame[1] = serial_number;
        frame[2] = subopcode;
        frame[3] = param1;
        frame[4] = param2;
        frame[COMMAND_LEN - 1] = TERMINATOR;
        Self(frame)
    }

    pub fn as_bytes(&self) -> &[u8; COMMAND_LEN] {
        &self.0
    }

    pub fn serial_number(&self) -> u8 {
        self.0[1]
    }

    pub fn subopcode(&self) -> u8 {
        self.0[2]
    }
}

impl AsRef<[u8]> for Command {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
