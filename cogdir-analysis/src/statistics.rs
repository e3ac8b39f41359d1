use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use cogdir_core::{BandPower, Direction, Mode};
use serde::{Deserialize, Serialize};

use crate::features::SessionFeatures;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionStats {
    pub trial_count: usize,
    pub band_averages: BandPower,
    pub band_std_deviations: BandPower,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub mode: Mode,
    pub timestamp: DateTime<Utc>,
    pub direction_stats: BTreeMap<Direction, DirectionStats>,
}

/// Mean and population standard deviation; zeros for an empty slice.
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

pub fn calculate_statistics(features: &SessionFeatures) -> AnalysisReport {
    let direction_stats = features
        .directions
        .iter()
        .map(|(&direction, data)| {
            let mut averages = [0.0; 5];
            let mut deviations = [0.0; 5];
            for band in 0..5 {
                let values: Vec<f64> = data
                    .trial_band_averages
                    .iter()
                    .map(|p| p.values()[band])
                    .collect();
                (averages[band], deviations[band]) = mean_and_std(&values);
            }
            let stats = DirectionStats {
                trial_count: data.trial_count,
                band_averages: BandPower::from_values(averages),
                band_std_deviations: BandPower::from_values(deviations),
            };
            (direction, stats)
        })
        .collect();
    AnalysisReport {
        mode: features.mode,
        timestamp: features.timestamp,
        direction_stats,
    }
}
