use cogdir_core::RunState;

use crate::attention::AttentionError;
use crate::config::ConfigError;
use crate::device::DeviceError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no mode selected; choose inner-speech, visualized or pronounced first")]
    NoModeSelected,
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("no session is running")]
    NotRunning,
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: RunState,
    },
    #[error("no recording device connected")]
    DeviceNotConnected,
    #[error("failed to start device session: {0}")]
    SessionStart(#[source] DeviceError),
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Attention(#[from] AttentionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
