use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use cogdir_core::SessionRecord;
use tracing::info;

use crate::features::extract_features;
use crate::statistics::{AnalysisReport, calculate_statistics};
use crate::{AnalysisError, BANDS};

pub fn load_session(path: impl AsRef<Path>) -> Result<SessionRecord, AnalysisError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Human-readable summary, one block per direction.
pub fn render_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Analysis Results for {} mode ===", report.mode);
    let _ = writeln!(out, "Session timestamp: {}", report.timestamp.to_rfc3339());
    for (direction, stats) in &report.direction_stats {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Direction: {} ({} trials)",
            direction.as_str().to_uppercase(),
            stats.trial_count
        );
        let _ = writeln!(out, "-------------------------------");
        let _ = writeln!(out, "Average power by frequency band:");
        for (band, value) in BANDS.iter().zip(stats.band_averages.values()) {
            let _ = writeln!(out, "  {band:<5}: {value:.6}");
        }
        let _ = writeln!(out, "Standard deviation by frequency band:");
        for (band, value) in BANDS.iter().zip(stats.band_std_deviations.values()) {
            let _ = writeln!(out, "  {band:<5}: {value:.6}");
        }
    }
    out
}

/// `<session dir>/../analysis/analysis-<mode>-<timestamp>.json`
pub fn analysis_path(session_path: &Path, report: &AnalysisReport) -> PathBuf {
    let session_dir = session_path.parent().unwrap_or_else(|| Path::new("."));
    session_dir.join("..").join("analysis").join(format!(
        "analysis-{}-{}.json",
        report.mode,
        report.timestamp.format("%Y-%m-%dT%H-%M-%S%.3fZ")
    ))
}

/// Loads a session file, computes its statistics and writes them as JSON.
pub fn analyze_file(
    session_path: impl AsRef<Path>,
) -> Result<(AnalysisReport, PathBuf), AnalysisError> {
    let session_path = session_path.as_ref();
    info!(path = %session_path.display(), "analyzing session");
    let record = load_session(session_path)?;
    let report = calculate_statistics(&extract_features(&record)?);

    let out = analysis_path(session_path, &report);
    if let Some(dir) = out.parent() {
        fs::create_dir_all(dir).map_err(|source| AnalysisError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(&out, json).map_err(|source| AnalysisError::Io {
        path: out.clone(),
        source,
    })?;
    info!(path = %out.display(), directions = report.direction_stats.len(), "analysis saved");
    Ok((report, out))
}
