use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::stimulus::{Direction, ParseError};

/// Mental strategy the subject uses during the action interval.
///
/// The mode only changes what the subject is told; timings are identical
/// across modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    InnerSpeech,
    Visualized,
    Pronounced,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::InnerSpeech, Mode::Visualized, Mode::Pronounced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::InnerSpeech => "inner-speech",
            Mode::Visualized => "visualized",
            Mode::Pronounced => "pronounced",
        }
    }

    pub fn announcement(&self) -> &'static str {
        match self {
            Mode::InnerSpeech => "INNER SPEECH MODE: Think the direction word without speaking",
            Mode::Visualized => "VISUALIZATION MODE: Imagine moving in the direction",
            Mode::Pronounced => "PRONOUNCED SPEECH MODE: Say the direction word aloud",
        }
    }

    pub fn action_instruction(&self, direction: Direction) -> String {
        match self {
            Mode::InnerSpeech => format!("Think the word: {direction}"),
            Mode::Visualized => format!("Imagine moving: {direction}"),
            Mode::Pronounced => format!("Say aloud: {direction}"),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner-speech" | "inner" | "inner_speech" => Ok(Mode::InnerSpeech),
            "visualized" | "visualization" => Ok(Mode::Visualized),
            "pronounced" | "spoken" => Ok(Mode::Pronounced),
            _ => Err(ParseError::UnknownMode(s.to_string())),
        }
    }
}
