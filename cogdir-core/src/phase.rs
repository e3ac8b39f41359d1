use std::fmt;

use serde::{Deserialize, Serialize};

/// Phases a single trial moves through, in order.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    #[default]
    Rest,
    Concentration,
    Cue,
    Action,
    Relax,
    Complete,
}

impl TrialPhase {
    pub fn next(&self) -> Option<Self> {
        use TrialPhase::*;
        Some(match self {
            Rest => Concentration,
            Concentration => Cue,
            Cue => Action,
            Action => Relax,
            Relax => Complete,
            Complete => return None,
        })
    }

    /// True for the phases during which the device records trial data.
    pub fn is_recorded(&self) -> bool {
        matches!(
            self,
            TrialPhase::Concentration | TrialPhase::Cue | TrialPhase::Action | TrialPhase::Relax
        )
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, TrialPhase::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialPhase::Rest => "rest",
            TrialPhase::Concentration => "concentration",
            TrialPhase::Cue => "cue",
            TrialPhase::Action => "action",
            TrialPhase::Relax => "relax",
            TrialPhase::Complete => "complete",
        }
    }
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
