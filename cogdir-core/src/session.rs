use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mode::Mode;
use crate::stimulus::Direction;
use crate::trial::Trial;

/// Lifecycle state of a session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    /// Paused by the operator.
    Paused,
    /// Suspended between trials while an attention check is outstanding.
    /// Distinct from `Paused`: `resume` does not release it.
    AwaitingCheck,
    Stopped,
}

impl RunState {
    /// True while a run owns the controller.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunState::Running | RunState::Paused | RunState::AwaitingCheck
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::AwaitingCheck => "awaiting_check",
            RunState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One full run of `total_trials` trials under a single mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub mode: Mode,
    pub total_trials: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub device_session_id: Option<String>,
    pub trials: Vec<Trial>,
    pub attention_check_trial_numbers: Vec<u32>,
}

impl Session {
    pub fn new(mode: Mode, total_trials: u32, attention_checks: Vec<u32>) -> Self {
        Self {
            mode,
            total_trials,
            start_time: Utc::now(),
            end_time: None,
            device_session_id: None,
            trials: Vec::with_capacity(total_trials as usize),
            attention_check_trial_numbers: attention_checks,
        }
    }

    pub fn is_check_scheduled(&self, trial_number: u32) -> bool {
        self.attention_check_trial_numbers
            .binary_search(&trial_number)
            .is_ok()
    }

    pub fn completed_trials(&self) -> usize {
        self.trials.iter().filter(|t| t.is_complete()).count()
    }

    /// Direction of the most recently started trial.
    pub fn last_direction(&self) -> Option<Direction> {
        self.trials.last().map(|t| t.direction)
    }

    /// Fraction of answered checks that were correct, `None` before any check.
    pub fn attention_accuracy(&self) -> Option<f64> {
        let checks: Vec<_> = self
            .trials
            .iter()
            .filter_map(|t| t.attention_check.as_ref())
            .collect();
        if checks.is_empty() {
            return None;
        }
        let correct = checks.iter().filter(|c| c.correct).count();
        Some(correct as f64 / checks.len() as f64)
    }
}
