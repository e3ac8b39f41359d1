use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stimulus::Direction;

/// Outcome of an attention check shown after a trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionCheckResult {
    pub asked_direction: Direction,
    /// `None` when the check timed out or the run stopped before an answer.
    pub answered_direction: Option<Direction>,
    pub correct: bool,
}

impl AttentionCheckResult {
    pub fn score(asked_direction: Direction, answered_direction: Option<Direction>) -> Self {
        Self {
            asked_direction,
            answered_direction,
            correct: answered_direction == Some(asked_direction),
        }
    }

    /// Feedback shown to the subject after answering.
    pub fn feedback(&self) -> String {
        if self.correct {
            "Correct! Continuing experiment...".to_string()
        } else {
            format!(
                "Incorrect. The direction was {}. Please pay more attention.",
                self.asked_direction
            )
        }
    }
}

/// One timed presentation of a direction cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trial {
    pub number: u32,
    pub direction: Direction,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention_check: Option<AttentionCheckResult>,
}

impl Trial {
    pub fn new(number: u32, direction: Direction) -> Self {
        Self {
            number,
            direction,
            start_time: None,
            end_time: None,
            attention_check: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }
}
