pub mod mode;
pub mod phase;
pub mod record;
pub mod session;
pub mod stimulus;
pub mod trial;

pub use mode::Mode;
pub use phase::TrialPhase;
pub use record::{BandPower, BandPowerFrame, BrainwaveSample, SessionRecord, TrialRecord};
pub use session::{RunState, Session};
pub use stimulus::{Cue, Direction, FocusColor, ParseError};
pub use trial::{AttentionCheckResult, Trial};
