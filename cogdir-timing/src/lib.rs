pub mod timer;

pub use timer::{DelayOutcome, TimingStats, Timer, TokioTimer};
pub use tokio_util::sync::CancellationToken;
