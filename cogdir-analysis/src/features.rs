use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use cogdir_core::{BandPower, Direction, Mode, SessionRecord, TrialRecord};
use tracing::debug;

use crate::AnalysisError;

/// Per-trial features of one cued direction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectionFeatures {
    /// All trials cued with this direction, with or without samples.
    pub trial_count: usize,
    /// One entry per trial that carried brainwave samples.
    pub trial_band_averages: Vec<BandPower>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionFeatures {
    pub mode: Mode,
    pub timestamp: DateTime<Utc>,
    pub directions: BTreeMap<Direction, DirectionFeatures>,
}

/// Mean band power of a trial over every channel reading of every sample.
///
/// `None` when the trial has no channel readings at all.
pub fn trial_band_average(trial: &TrialRecord) -> Option<BandPower> {
    let mut sums = [0.0f64; 5];
    let mut readings = 0usize;
    for channel in trial.brainwaves.iter().flat_map(|s| &s.data.data) {
        for (sum, value) in sums.iter_mut().zip(channel.values()) {
            *sum += value;
        }
        readings += 1;
    }
    if readings == 0 {
        return None;
    }
    Some(BandPower::from_values(sums.map(|s| s / readings as f64)))
}

/// Groups trials by direction and reduces each to its band averages.
pub fn extract_features(record: &SessionRecord) -> Result<SessionFeatures, AnalysisError> {
    if record.trials.is_empty() {
        return Err(AnalysisError::EmptySession);
    }
    let mut directions: BTreeMap<Direction, DirectionFeatures> = BTreeMap::new();
    for trial in &record.trials {
        let entry = directions.entry(trial.direction).or_default();
        entry.trial_count += 1;
        match trial_band_average(trial) {
            Some(avg) => entry.trial_band_averages.push(avg),
            None => debug!(trial = ?trial.trial_number, "trial has no brainwave samples"),
        }
    }
    Ok(SessionFeatures {
        mode: record.mode,
        timestamp: record.timestamp,
        directions,
    })
}
