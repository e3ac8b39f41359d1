//! Boundary to the brain-signal recording headset.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cogdir_core::{Direction, Mode, SessionRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("device not connected")]
    NotConnected,
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("no active session")]
    NoActiveSession,
    #[error("no active trial to end")]
    NoActiveTrial,
    #[error("device rejected request: {0}")]
    Rejected(String),
    #[error("device transport failure: {0}")]
    Transport(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub device_id: String,
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        device_id: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Reads `DEVICE_ID`, `EMAIL` and `PASSWORD`; `None` if any is missing
    /// or blank.
    pub fn from_env() -> Option<Self> {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Some(Self::new(read("DEVICE_ID")?, read("EMAIL")?, read("PASSWORD")?))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("device_id", &self.device_id)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub mode: Mode,
    pub start_time: DateTime<Utc>,
    pub total_trials: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialInfo {
    pub trial_number: u32,
    pub direction: Direction,
    pub condition: Mode,
    pub timestamp: DateTime<Utc>,
}

/// Session and trial boundaries of an external recording device.
///
/// A `start_trial` while a trial is still open replaces the open trial; the
/// controller relies on this when a paused trial is re-run.
#[async_trait]
pub trait DeviceAdapter: Send {
    async fn connect(&mut self, credentials: &Credentials) -> Result<(), DeviceError>;
    /// Returns the device-side session id.
    async fn start_session(&mut self, info: &SessionInfo) -> Result<String, DeviceError>;
    async fn start_trial(&mut self, info: &TrialInfo) -> Result<(), DeviceError>;
    async fn end_trial(&mut self) -> Result<(), DeviceError>;
    async fn end_session(&mut self) -> Result<SessionRecord, DeviceError>;
}

/// Optional connected adapter shared by the controller and its trial loop.
#[derive(Default)]
pub struct DeviceLink {
    adapter: Mutex<Option<Box<dyn DeviceAdapter>>>,
}

impl DeviceLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_connected(&self) -> bool {
        self.adapter.lock().await.is_some()
    }

    /// Connects `adapter` and keeps it only if the connection succeeds.
    pub async fn attach(
        &self,
        mut adapter: Box<dyn DeviceAdapter>,
        credentials: &Credentials,
    ) -> Result<(), DeviceError> {
        adapter.connect(credentials).await?;
        *self.adapter.lock().await = Some(adapter);
        Ok(())
    }

    pub async fn detach(&self) -> Option<Box<dyn DeviceAdapter>> {
        self.adapter.lock().await.take()
    }

    pub async fn start_session(&self, info: &SessionInfo) -> Result<String, DeviceError> {
        match self.adapter.lock().await.as_mut() {
            Some(adapter) => adapter.start_session(info).await,
            None => Err(DeviceError::NotConnected),
        }
    }

    pub async fn start_trial(&self, info: &TrialInfo) -> Result<(), DeviceError> {
        match self.adapter.lock().await.as_mut() {
            Some(adapter) => adapter.start_trial(info).await,
            None => Err(DeviceError::NotConnected),
        }
    }

    pub async fn end_trial(&self) -> Result<(), DeviceError> {
        match self.adapter.lock().await.as_mut() {
            Some(adapter) => adapter.end_trial().await,
            None => Err(DeviceError::NotConnected),
        }
    }

    pub async fn end_session(&self) -> Result<SessionRecord, DeviceError> {
        match self.adapter.lock().await.as_mut() {
            Some(adapter) => adapter.end_session().await,
            None => Err(DeviceError::NotConnected),
        }
    }
}

impl fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("dev-1", "a@b.c", "hunter2");
        let printed = format!("{creds:?}");
        assert!(printed.contains("dev-1"));
        assert!(!printed.contains("hunter2"));
    }

    #[tokio::test]
    async fn unattached_link_reports_not_connected() {
        let link = DeviceLink::new();
        assert!(!link.is_connected().await);
        assert_eq!(link.end_trial().await, Err(DeviceError::NotConnected));
    }
}
