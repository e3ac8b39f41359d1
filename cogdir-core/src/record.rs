//! Persisted session format shared by the recorder and offline analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mode::Mode;
use crate::session::Session;
use crate::stimulus::Direction;
use crate::trial::AttentionCheckResult;

/// Average power per frequency band for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandPower {
    pub delta: f64,
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl BandPower {
    pub fn values(&self) -> [f64; 5] {
        [self.delta, self.theta, self.alpha, self.beta, self.gamma]
    }

    pub fn from_values(v: [f64; 5]) -> Self {
        Self {
            delta: v[0],
            theta: v[1],
            alpha: v[2],
            beta: v[3],
            gamma: v[4],
        }
    }
}

/// One power-by-band reading across all channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandPowerFrame {
    pub data: Vec<BandPower>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainwaveSample {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub data: BandPowerFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_number: Option<u32>,
    pub direction: Direction,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brainwaves: Vec<BrainwaveSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention_check: Option<AttentionCheckResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub mode: Mode,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trials: Vec<TrialRecord>,
}

impl SessionRecord {
    pub fn new(mode: Mode, timestamp: DateTime<Utc>) -> Self {
        Self {
            mode,
            timestamp,
            session_id: None,
            end_time: None,
            trials: Vec::new(),
        }
    }

    /// Trial log of a session run without a recording device.
    pub fn from_session(session: &Session) -> Self {
        let trials = session
            .trials
            .iter()
            .filter_map(|t| {
                Some(TrialRecord {
                    trial_number: Some(t.number),
                    direction: t.direction,
                    start_time: t.start_time?,
                    end_time: t.end_time,
                    brainwaves: Vec::new(),
                    attention_check: t.attention_check.clone(),
                })
            })
            .collect();
        Self {
            mode: session.mode,
            timestamp: session.start_time,
            session_id: session.device_session_id.clone(),
            end_time: session.end_time,
            trials,
        }
    }

    /// Copies attention-check outcomes from the engine's own log onto the
    /// device record, matching by trial number.
    pub fn merge_attention_checks(&mut self, session: &Session) {
        for record in &mut self.trials {
            let Some(number) = record.trial_number else {
                continue;
            };
            if let Some(trial) = session.trials.iter().find(|t| t.number == number) {
                record.attention_check = trial.attention_check.clone();
            }
        }
    }
}
