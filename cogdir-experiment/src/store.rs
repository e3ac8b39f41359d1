//! JSON persistence of session records.

use std::fs;
use std::path::{Path, PathBuf};

use cogdir_core::SessionRecord;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes one pretty-printed JSON file per session into a directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<mode>-session-<timestamp>.json`, with colons kept out of the name.
    pub fn file_name(record: &SessionRecord) -> String {
        format!(
            "{}-session-{}.json",
            record.mode,
            record.timestamp.format("%Y-%m-%dT%H-%M-%S%.3fZ")
        )
    }

    pub fn save(&self, record: &SessionRecord) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(Self::file_name(record));
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), trials = record.trials.len(), "session saved");
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<SessionRecord, StoreError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cogdir_core::{Direction, Mode, TrialRecord};

    #[test]
    fn saves_into_nested_directory_and_loads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path().join("data").join("raw"));
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let mut record = SessionRecord::new(Mode::Visualized, start);
        record.trials.push(TrialRecord {
            trial_number: Some(1),
            direction: Direction::Left,
            start_time: start,
            end_time: Some(start),
            brainwaves: Vec::new(),
            attention_check: None,
        });

        let path = store.save(&record).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "visualized-session-2025-03-01T10-00-00.000Z.json"
        );
        assert_eq!(SessionStore::load(&path).unwrap(), record);
    }

    #[test]
    fn loading_garbage_reports_json_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SessionStore::load(&path), Err(StoreError::Json(_))));
    }
}
