use std::path::Path;
use std::time::Duration;

use cogdir_core::Direction;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How directions are assigned to trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Paradigm {
    /// Up/down/left/right, each trial drawn independently.
    FourDirection {
        #[serde(default = "default_total_trials")]
        total_trials: u32,
    },
    /// Fixed counts of up and down trials.
    Balanced {
        #[serde(default = "default_block_trials")]
        up_trials: u32,
        #[serde(default = "default_block_trials")]
        down_trials: u32,
        #[serde(default = "default_true")]
        randomize: bool,
    },
}

fn default_total_trials() -> u32 {
    40
}

fn default_block_trials() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for Paradigm {
    fn default() -> Self {
        Paradigm::FourDirection {
            total_trials: default_total_trials(),
        }
    }
}

impl Paradigm {
    pub fn total_trials(&self) -> u32 {
        match self {
            Paradigm::FourDirection { total_trials } => *total_trials,
            Paradigm::Balanced {
                up_trials,
                down_trials,
                ..
            } => up_trials.saturating_add(*down_trials),
        }
    }

    pub fn directions(&self) -> &'static [Direction] {
        match self {
            Paradigm::FourDirection { .. } => &Direction::ALL,
            Paradigm::Balanced { .. } => &Direction::BINARY,
        }
    }
}

/// Phase durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTimings {
    pub concentration_ms: u64,
    pub cue_ms: u64,
    pub action_ms: u64,
    pub relax_ms: u64,
    /// Inclusive bounds of the randomized rest before each trial.
    pub rest_range_ms: (u64, u64),
    pub countdown_steps: u32,
    pub countdown_step_ms: u64,
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self {
            concentration_ms: 500,
            cue_ms: 500,
            action_ms: 2500,
            relax_ms: 1000,
            rest_range_ms: (1500, 2000),
            countdown_steps: 3,
            countdown_step_ms: 1000,
        }
    }
}

impl PhaseTimings {
    pub fn concentration(&self) -> Duration {
        Duration::from_millis(self.concentration_ms)
    }

    pub fn cue(&self) -> Duration {
        Duration::from_millis(self.cue_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn relax(&self) -> Duration {
        Duration::from_millis(self.relax_ms)
    }

    pub fn countdown_step(&self) -> Duration {
        Duration::from_millis(self.countdown_step_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    /// Fraction of trials followed by a check.
    pub check_probability: f64,
    /// How long feedback stays on screen before the session resumes.
    pub feedback_ms: u64,
    /// Unanswered checks count as incorrect after this long; `None` waits
    /// indefinitely.
    pub timeout_ms: Option<u64>,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            check_probability: 0.15,
            feedback_ms: 2500,
            timeout_ms: None,
        }
    }
}

impl AttentionConfig {
    pub fn feedback(&self) -> Duration {
        Duration::from_millis(self.feedback_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub paradigm: Paradigm,
    pub timings: PhaseTimings,
    pub attention: AttentionConfig,
    /// Refuse to start unless a recording device is connected.
    pub require_device: bool,
    /// Seed for trial sequences; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl ExperimentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn total_trials(&self) -> u32 {
        self.paradigm.total_trials()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Paradigm::Balanced {
            up_trials,
            down_trials,
            ..
        } = &self.paradigm
        {
            if up_trials.checked_add(*down_trials).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "up_trials {up_trials} plus down_trials {down_trials} overflows the trial count"
                )));
            }
        }
        if self.total_trials() == 0 {
            return Err(ConfigError::Invalid(
                "a session needs at least one trial".into(),
            ));
        }
        let (rest_min, rest_max) = self.timings.rest_range_ms;
        if rest_min > rest_max {
            return Err(ConfigError::Invalid(format!(
                "rest_range_ms lower bound {rest_min} exceeds upper bound {rest_max}"
            )));
        }
        let t = &self.timings;
        if t.concentration_ms == 0 || t.cue_ms == 0 || t.action_ms == 0 || t.relax_ms == 0 {
            return Err(ConfigError::Invalid(
                "concentration, cue, action and relax durations must be non-zero".into(),
            ));
        }
        let p = self.attention.check_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::Invalid(format!(
                "check_probability {p} is outside [0, 1]"
            )));
        }
        if self.attention.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "attention timeout_ms must be positive when set".into(),
            ));
        }
        Ok(())
    }
}
