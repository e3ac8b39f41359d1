use cogdir_core::Cue;
use tracing::debug;

/// Receives the engine's presentation side effects.
///
/// Called from the trial loop; implementations must return quickly.
pub trait Presenter: Send + Sync {
    fn present(&self, cue: &Cue);
}

/// Presenter that only logs cues, for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn present(&self, cue: &Cue) {
        debug!(cue = cue.label(), ?cue, "present");
    }
}
