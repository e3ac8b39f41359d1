//! Offline analysis of recorded sessions: per-trial band power features,
//! grouped by cued direction, summarized as mean and spread per band.

use std::path::PathBuf;

pub mod features;
pub mod report;
pub mod statistics;

pub use features::{DirectionFeatures, SessionFeatures, extract_features, trial_band_average};
pub use report::{analysis_path, analyze_file, load_session, render_report};
pub use statistics::{AnalysisReport, DirectionStats, calculate_statistics, mean_and_std};

/// Frequency bands in the order they are reported.
pub const BANDS: [&str; 5] = ["delta", "theta", "alpha", "beta", "gamma"];

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("session has no trials")]
    EmptySession,
}
