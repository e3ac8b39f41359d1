//! Attention checks between trials.
//!
//! A check suspends the trial loop in [`RunState::AwaitingCheck`] until the
//! subject answers through [`AttentionCheckCoordinator::submit_answer`]. The
//! pending answer lives in a single slot, so "a check is already pending" is
//! an explicit, checkable condition rather than a stray callback.

use std::sync::Mutex;

use cogdir_core::{AttentionCheckResult, Cue, Direction, RunState};
use cogdir_timing::{CancellationToken, Timer};
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use crate::config::AttentionConfig;
use crate::presenter::Presenter;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttentionError {
    #[error("an attention check is already pending")]
    AlreadyPending,
    #[error("no attention check is pending")]
    NoPendingCheck,
}

/// What the check needs from the controller while it runs.
pub struct CheckContext<'a, T: Timer> {
    pub timer: &'a T,
    pub presenter: &'a dyn Presenter,
    pub state: &'a watch::Sender<RunState>,
    pub cancel: &'a CancellationToken,
    pub config: &'a AttentionConfig,
}

#[derive(Debug, Default)]
pub struct AttentionCheckCoordinator {
    pending: Mutex<Option<oneshot::Sender<Direction>>>,
}

impl AttentionCheckCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.slot().is_some()
    }

    /// Delivers the subject's answer to the outstanding check.
    pub fn submit_answer(&self, direction: Direction) -> Result<(), AttentionError> {
        let sender = self.slot().take().ok_or(AttentionError::NoPendingCheck)?;
        sender
            .send(direction)
            .map_err(|_| AttentionError::NoPendingCheck)
    }

    /// Drops any pending check; its waiter resolves as abandoned.
    pub fn cancel(&self) {
        self.slot().take();
    }

    /// Presents a check for `trial` and waits for the answer.
    ///
    /// Returns `Ok(None)` when the run is stopped before the check resolves.
    /// A timed-out check resolves as incorrect with no answer.
    pub async fn await_check<T: Timer>(
        &self,
        ctx: CheckContext<'_, T>,
        trial: u32,
        correct_direction: Direction,
    ) -> Result<Option<AttentionCheckResult>, AttentionError> {
        let mut answer = self.arm()?;

        ctx.state.send_if_modified(|s| {
            if *s == RunState::Running {
                *s = RunState::AwaitingCheck;
                true
            } else {
                false
            }
        });
        ctx.presenter.present(&Cue::AttentionCheck { trial });

        let expiry = async {
            match ctx.config.timeout() {
                Some(limit) => ctx.timer.sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        let answered = tokio::select! {
            received = &mut answer => match received {
                Ok(direction) => Some(direction),
                Err(_) => return Ok(None),
            },
            _ = expiry => {
                warn!(trial, "attention check timed out; scoring as incorrect");
                None
            }
            _ = ctx.cancel.cancelled() => {
                self.cancel();
                return Ok(None);
            }
        };
        self.cancel();

        let result = AttentionCheckResult::score(correct_direction, answered);
        info!(
            trial,
            asked = %correct_direction,
            answered = ?answered,
            correct = result.correct,
            "attention check answered"
        );
        ctx.presenter.present(&Cue::AttentionFeedback {
            correct: result.correct,
            message: result.feedback(),
        });

        if ctx
            .timer
            .delay(ctx.config.feedback(), ctx.cancel)
            .await
            .is_cancelled()
        {
            return Ok(Some(result));
        }

        ctx.state.send_if_modified(|s| {
            if *s == RunState::AwaitingCheck {
                *s = RunState::Running;
                true
            } else {
                false
            }
        });
        Ok(Some(result))
    }

    fn arm(&self) -> Result<oneshot::Receiver<Direction>, AttentionError> {
        let mut slot = self.slot();
        debug_assert!(slot.is_none(), "a second attention check was requested");
        if slot.is_some() {
            return Err(AttentionError::AlreadyPending);
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        Ok(rx)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<Direction>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
