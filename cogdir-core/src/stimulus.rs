use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::mode::Mode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown direction `{0}` (expected up, down, left or right)")]
    UnknownDirection(String),
    #[error("unknown mode `{0}` (expected inner-speech, visualized or pronounced)")]
    UnknownMode(String),
}

/// Cued direction of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Directions used by the balanced up/down paradigm.
    pub const BINARY: [Direction; 2] = [Direction::Up, Direction::Down];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "u" => Ok(Direction::Up),
            "down" | "d" => Ok(Direction::Down),
            "left" | "l" => Ok(Direction::Left),
            "right" | "r" => Ok(Direction::Right),
            _ => Err(ParseError::UnknownDirection(s.to_string())),
        }
    }
}

/// Colour of the central focus circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusColor {
    /// Rest between trials.
    Muted,
    /// Concentration interval.
    White,
    /// Relax interval.
    Blue,
    Hidden,
}

/// Presentation side effects requested by the engine.
///
/// The engine never renders anything itself; a `Presenter` turns these into
/// screen updates, console lines or test recordings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cue {
    ModeAnnouncement { mode: Mode, text: String },
    Countdown { remaining: u32 },
    Progress { trial: u32, total: u32 },
    Rest { duration_ms: u64 },
    Focus { color: FocusColor, text: String },
    Direction { direction: Direction },
    Action { mode: Mode, direction: Direction, instruction: String },
    Relax,
    TrialEnd { trial: u32 },
    AttentionCheck { trial: u32 },
    AttentionFeedback { correct: bool, message: String },
    Paused,
    Resumed,
    SessionComplete { message: String },
}

impl Cue {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Cue::ModeAnnouncement { .. } => "mode_announcement",
            Cue::Countdown { .. } => "countdown",
            Cue::Progress { .. } => "progress",
            Cue::Rest { .. } => "rest",
            Cue::Focus { .. } => "focus",
            Cue::Direction { .. } => "direction",
            Cue::Action { .. } => "action",
            Cue::Relax => "relax",
            Cue::TrialEnd { .. } => "trial_end",
            Cue::AttentionCheck { .. } => "attention_check",
            Cue::AttentionFeedback { .. } => "attention_feedback",
            Cue::Paused => "paused",
            Cue::Resumed => "resumed",
            Cue::SessionComplete { .. } => "session_complete",
        }
    }
}
