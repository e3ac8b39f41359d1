//! Drives one trial through its phases.

use std::time::Duration;

use chrono::Utc;
use cogdir_core::{Cue, FocusColor, Mode, RunState, Trial, TrialPhase};
use cogdir_timing::{CancellationToken, Timer};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::PhaseTimings;
use crate::device::{DeviceLink, TrialInfo};
use crate::presenter::Presenter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Completed,
    /// The run left `Running` before `phase` could hand over to the next one.
    Interrupted { phase: TrialPhase, state: RunState },
}

impl TrialOutcome {
    /// Whether the device recording window had opened.
    pub fn reached_recording(&self) -> bool {
        match self {
            TrialOutcome::Completed => true,
            TrialOutcome::Interrupted { phase, .. } => phase.is_recorded(),
        }
    }
}

/// Borrowed view of everything a trial needs from its controller.
pub struct TrialMachine<'a, T: Timer> {
    pub timer: &'a T,
    pub presenter: &'a dyn Presenter,
    pub device: &'a DeviceLink,
    pub device_connected: bool,
    pub state: &'a watch::Sender<RunState>,
    pub cancel: &'a CancellationToken,
    pub timings: &'a PhaseTimings,
    pub mode: Mode,
    pub total_trials: u32,
}

impl<T: Timer> TrialMachine<'_, T> {
    /// Runs `trial` from `Rest` to `Complete`.
    ///
    /// The run state is checked after every phase delay; anything other than
    /// `Running` aborts without emitting completion or ending the device
    /// trial.
    pub async fn run(&self, trial: &mut Trial, rest: Duration) -> TrialOutcome {
        let mut phase = TrialPhase::Rest;
        loop {
            self.enter(phase, trial, rest).await;
            self.timer
                .delay(self.duration_of(phase, rest), self.cancel)
                .await;

            let state = *self.state.borrow();
            if state != RunState::Running {
                debug!(trial = trial.number, %phase, %state, "trial interrupted");
                return TrialOutcome::Interrupted { phase, state };
            }

            match phase.next() {
                Some(next) if !next.is_complete() => phase = next,
                _ => break,
            }
        }
        self.complete(trial).await;
        TrialOutcome::Completed
    }

    fn duration_of(&self, phase: TrialPhase, rest: Duration) -> Duration {
        match phase {
            TrialPhase::Rest => rest,
            TrialPhase::Concentration => self.timings.concentration(),
            TrialPhase::Cue => self.timings.cue(),
            TrialPhase::Action => self.timings.action(),
            TrialPhase::Relax => self.timings.relax(),
            TrialPhase::Complete => Duration::ZERO,
        }
    }

    async fn enter(&self, phase: TrialPhase, trial: &mut Trial, rest: Duration) {
        let direction = trial.direction;
        match phase {
            TrialPhase::Rest => {
                self.show(Cue::Progress {
                    trial: trial.number,
                    total: self.total_trials,
                });
                self.show(Cue::Focus {
                    color: FocusColor::Muted,
                    text: "Rest...".into(),
                });
                self.show(Cue::Rest {
                    duration_ms: rest.as_millis() as u64,
                });
            }
            TrialPhase::Concentration => {
                let now = Utc::now();
                trial.start_time = Some(now);
                if self.device_connected {
                    let info = TrialInfo {
                        trial_number: trial.number,
                        direction,
                        condition: self.mode,
                        timestamp: now,
                    };
                    if let Err(err) = self.device.start_trial(&info).await {
                        warn!(trial = trial.number, %err, "device start_trial failed; continuing");
                    }
                }
                self.show(Cue::Focus {
                    color: FocusColor::White,
                    text: "Focus on the circle".into(),
                });
            }
            TrialPhase::Cue => self.show(Cue::Direction { direction }),
            TrialPhase::Action => self.show(Cue::Action {
                mode: self.mode,
                direction,
                instruction: self.mode.action_instruction(direction),
            }),
            TrialPhase::Relax => {
                self.show(Cue::Focus {
                    color: FocusColor::Blue,
                    text: "Relax (don't blink)".into(),
                });
                self.show(Cue::Relax);
            }
            TrialPhase::Complete => {}
        }
    }

    async fn complete(&self, trial: &mut Trial) {
        trial.end_time = Some(Utc::now());
        self.show(Cue::Focus {
            color: FocusColor::Hidden,
            text: String::new(),
        });
        self.show(Cue::TrialEnd {
            trial: trial.number,
        });
        if self.device_connected {
            if let Err(err) = self.device.end_trial().await {
                warn!(trial = trial.number, %err, "device end_trial failed; trial data may be incomplete");
            }
        }
        debug!(trial = trial.number, direction = %trial.direction, "trial complete");
    }

    fn show(&self, cue: Cue) {
        self.presenter.present(&cue);
    }
}
