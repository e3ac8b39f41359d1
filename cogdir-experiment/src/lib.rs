pub mod attention;
pub mod config;
pub mod device;
pub mod error;
pub mod presenter;
pub mod sequencer;
pub mod state;
pub mod store;
pub mod trial;

pub use attention::{AttentionCheckCoordinator, AttentionError};
pub use config::{AttentionConfig, ConfigError, ExperimentConfig, Paradigm, PhaseTimings};
pub use device::{Credentials, DeviceAdapter, DeviceError, DeviceLink, SessionInfo, TrialInfo};
pub use error::SessionError;
pub use presenter::{LogPresenter, Presenter};
pub use state::{ControllerBuilder, EndReason, RunReport, SessionController, StopReport};
pub use store::{SessionStore, StoreError};
pub use trial::{TrialMachine, TrialOutcome};
