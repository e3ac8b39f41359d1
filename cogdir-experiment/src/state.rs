//! Session lifecycle: mode selection, run state transitions and the trial loop.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use cogdir_core::{Cue, Direction, Mode, RunState, Session, SessionRecord, Trial};
use cogdir_timing::{CancellationToken, Timer, TokioTimer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::attention::{AttentionCheckCoordinator, CheckContext};
use crate::config::{ConfigError, ExperimentConfig};
use crate::device::{Credentials, DeviceAdapter, DeviceLink, SessionInfo};
use crate::error::SessionError;
use crate::presenter::{LogPresenter, Presenter};
use crate::sequencer::{generate_attention_checks, generate_sequence};
use crate::store::SessionStore;
use crate::trial::{TrialMachine, TrialOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Every trial ran.
    Completed,
    /// `stop` was called first.
    Stopped,
}

/// Outcome of ending a session.
#[derive(Debug, Clone, PartialEq)]
pub struct StopReport {
    pub reason: EndReason,
    pub completed_trials: usize,
    pub device_session_id: Option<String>,
    pub saved_to: Option<PathBuf>,
    pub error: Option<String>,
}

impl StopReport {
    pub fn data_saved(&self) -> bool {
        self.saved_to.is_some() && self.error.is_none()
    }

    /// Closing line shown to the subject.
    pub fn message(&self) -> String {
        match (&self.saved_to, &self.error) {
            (_, Some(_)) => {
                "Experiment completed, but there was an error saving data.".to_string()
            }
            (Some(path), None) => {
                format!("Experiment completed. Data saved to: {}", path.display())
            }
            (None, None) => "Experiment completed.".to_string(),
        }
    }
}

/// Final session plus how it ended.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session: Session,
    pub stop: StopReport,
}

#[derive(Debug, Default)]
struct RunBook {
    session: Option<Session>,
    sequence: Vec<Direction>,
    trial_counter: u32,
    retry_current: bool,
    last_direction: Option<Direction>,
    device_session_active: bool,
    finalizing: bool,
}

#[derive(Debug, Default)]
struct RunHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

enum Step {
    Continue,
    Finished,
    Halted,
}

struct Inner<T: Timer> {
    config: ExperimentConfig,
    timer: T,
    presenter: Arc<dyn Presenter>,
    device: DeviceLink,
    store: Option<SessionStore>,
    state: watch::Sender<RunState>,
    finished: watch::Sender<Option<RunReport>>,
    checks: AttentionCheckCoordinator,
    rng: Mutex<StdRng>,
    book: Mutex<RunBook>,
    run: Mutex<RunHandle>,
    selected_mode: Mutex<Option<Mode>>,
}

pub struct ControllerBuilder<T: Timer> {
    config: ExperimentConfig,
    timer: T,
    presenter: Arc<dyn Presenter>,
    store: Option<SessionStore>,
}

impl ControllerBuilder<TokioTimer> {
    pub fn new(config: ExperimentConfig) -> Self {
        Self {
            config,
            timer: TokioTimer::new(),
            presenter: Arc::new(LogPresenter),
            store: None,
        }
    }
}

impl<T: Timer> ControllerBuilder<T> {
    pub fn timer<U: Timer>(self, timer: U) -> ControllerBuilder<U> {
        ControllerBuilder {
            config: self.config,
            timer,
            presenter: self.presenter,
            store: self.store,
        }
    }

    pub fn presenter(mut self, presenter: impl Presenter + 'static) -> Self {
        self.presenter = Arc::new(presenter);
        self
    }

    pub fn shared_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// Persist finished sessions into `store`.
    pub fn store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<SessionController<T>, ConfigError> {
        self.config.validate()?;
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(SessionController {
            inner: Arc::new(Inner {
                config: self.config,
                timer: self.timer,
                presenter: self.presenter,
                device: DeviceLink::new(),
                store: self.store,
                state: watch::Sender::new(RunState::Idle),
                finished: watch::Sender::new(None),
                checks: AttentionCheckCoordinator::new(),
                rng: Mutex::new(rng),
                book: Mutex::new(RunBook::default()),
                run: Mutex::new(RunHandle::default()),
                selected_mode: Mutex::new(None),
            }),
        })
    }
}

/// Owns one subject's sessions. Cheap to clone; clones share the same run.
pub struct SessionController<T: Timer = TokioTimer> {
    inner: Arc<Inner<T>>,
}

impl<T: Timer> Clone for SessionController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SessionController<TokioTimer> {
    pub fn builder(config: ExperimentConfig) -> ControllerBuilder<TokioTimer> {
        ControllerBuilder::new(config)
    }
}

impl<T: Timer> SessionController<T> {
    pub fn config(&self) -> &ExperimentConfig {
        &self.inner.config
    }

    pub fn state(&self) -> RunState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.inner.state.subscribe()
    }

    pub fn selected_mode(&self) -> Option<Mode> {
        *lock(&self.inner.selected_mode)
    }

    /// Chooses the mode for the next run. Rejected while a run is active.
    pub fn select_mode(&self, mode: Mode) -> Result<(), SessionError> {
        if self.is_busy() {
            return Err(SessionError::InvalidState {
                action: "select a mode",
                state: self.state(),
            });
        }
        *lock(&self.inner.selected_mode) = Some(mode);
        info!(%mode, "mode selected");
        Ok(())
    }

    pub async fn connect_device(
        &self,
        adapter: Box<dyn DeviceAdapter>,
        credentials: &Credentials,
    ) -> Result<(), SessionError> {
        if self.is_busy() {
            return Err(SessionError::AlreadyRunning);
        }
        self.inner.device.attach(adapter, credentials).await?;
        info!(device_id = %credentials.device_id, "device connected");
        Ok(())
    }

    pub async fn disconnect_device(&self) -> Result<(), SessionError> {
        if self.is_busy() {
            return Err(SessionError::AlreadyRunning);
        }
        if self.inner.device.detach().await.is_some() {
            info!("device disconnected");
        }
        Ok(())
    }

    pub async fn is_device_connected(&self) -> bool {
        self.inner.device.is_connected().await
    }

    /// Number of the trial most recently begun; 0 before the first.
    pub fn current_trial(&self) -> u32 {
        self.book().trial_counter
    }

    pub fn last_direction(&self) -> Option<Direction> {
        self.book().last_direction
    }

    pub fn is_check_pending(&self) -> bool {
        self.inner.checks.is_pending()
    }

    /// The session in progress, or the most recently finished one.
    pub fn session(&self) -> Option<Session> {
        if let Some(session) = self.book().session.clone() {
            return Some(session);
        }
        self.last_report().map(|report| report.session)
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.inner.finished.borrow().clone()
    }

    /// Resolves once the current run has been finalized.
    ///
    /// Returns the previous report immediately if no new run was started
    /// since, and never resolves before the first run.
    pub async fn wait_finished(&self) -> Option<RunReport> {
        let mut rx = self.inner.finished.subscribe();
        let report = rx.wait_for(|r| r.is_some()).await.ok()?;
        report.clone()
    }

    /// Selects `mode` and starts a run with it.
    pub async fn start_with(&self, mode: Mode) -> Result<(), SessionError> {
        if self.state() != RunState::Paused {
            self.select_mode(mode)?;
        }
        self.start().await
    }

    /// Starts a run with the selected mode, or resumes a paused one.
    pub async fn start(&self) -> Result<(), SessionError> {
        match self.state() {
            RunState::Paused => return self.resume(),
            RunState::Running | RunState::AwaitingCheck => {
                return Err(SessionError::AlreadyRunning);
            }
            RunState::Idle | RunState::Stopped => {}
        }
        let mode = self.selected_mode().ok_or(SessionError::NoModeSelected)?;
        let device_connected = self.inner.device.is_connected().await;
        if self.inner.config.require_device && !device_connected {
            return Err(SessionError::DeviceNotConnected);
        }
        self.launch(mode, device_connected).await
    }

    async fn launch(&self, mode: Mode, device_connected: bool) -> Result<(), SessionError> {
        let config = &self.inner.config;
        let total = config.total_trials();
        let (sequence, checks) = {
            let mut rng = lock(&self.inner.rng);
            let checks =
                generate_attention_checks(total, config.attention.check_probability, &mut *rng);
            (generate_sequence(&config.paradigm, &mut *rng), checks)
        };
        let session = Session::new(mode, total, checks);
        let start_time = session.start_time;
        let check_trials = session.attention_check_trial_numbers.clone();

        {
            let mut book = self.book();
            if book.session.is_some() || self.state().is_active() {
                return Err(SessionError::AlreadyRunning);
            }
            *book = RunBook {
                session: Some(session),
                sequence,
                ..RunBook::default()
            };
        }

        if device_connected {
            let info = SessionInfo {
                mode,
                start_time,
                total_trials: total,
            };
            match self.inner.device.start_session(&info).await {
                Ok(id) => {
                    info!(session_id = %id, "device session started");
                    let mut book = self.book();
                    book.device_session_active = true;
                    if let Some(session) = book.session.as_mut() {
                        session.device_session_id = Some(id);
                    }
                }
                Err(err) => {
                    error!(%err, "device refused to start a session");
                    *self.book() = RunBook::default();
                    self.inner.state.send_replace(RunState::Idle);
                    return Err(SessionError::SessionStart(err));
                }
            }
        }

        self.inner.finished.send_replace(None);
        let cancel = CancellationToken::new();
        *lock(&self.inner.run) = RunHandle {
            cancel: cancel.clone(),
            task: None,
        };
        self.inner.state.send_replace(RunState::Running);
        info!(%mode, total, attention_checks = ?check_trials, "session started");

        let span = info_span!("session", %mode);
        let task = tokio::spawn(
            self.clone()
                .run_loop(mode, device_connected, cancel)
                .instrument(span),
        );
        lock(&self.inner.run).task = Some(task);
        Ok(())
    }

    /// Toggles between `Running` and `Paused`. Returns the new state.
    ///
    /// A trial paused mid-way is re-run from its rest phase on resume.
    pub fn pause(&self) -> Result<RunState, SessionError> {
        let mut outcome = Err(SessionError::NotRunning);
        self.inner.state.send_if_modified(|s| match *s {
            RunState::Running => {
                *s = RunState::Paused;
                outcome = Ok(RunState::Paused);
                true
            }
            RunState::Paused => {
                *s = RunState::Running;
                outcome = Ok(RunState::Running);
                true
            }
            RunState::AwaitingCheck => {
                outcome = Err(SessionError::InvalidState {
                    action: "pause",
                    state: *s,
                });
                false
            }
            RunState::Idle | RunState::Stopped => false,
        });
        match outcome {
            Ok(RunState::Paused) => self.announce_pause(true),
            Ok(_) => self.announce_pause(false),
            Err(_) => {}
        }
        outcome
    }

    pub fn resume(&self) -> Result<(), SessionError> {
        let mut outcome = Err(SessionError::NotRunning);
        self.inner.state.send_if_modified(|s| match *s {
            RunState::Paused => {
                *s = RunState::Running;
                outcome = Ok(());
                true
            }
            RunState::Running | RunState::AwaitingCheck => {
                outcome = Err(SessionError::InvalidState {
                    action: "resume",
                    state: *s,
                });
                false
            }
            RunState::Idle | RunState::Stopped => false,
        });
        if outcome.is_ok() {
            self.announce_pause(false);
        }
        outcome
    }

    fn announce_pause(&self, paused: bool) {
        if paused {
            info!(trial = self.current_trial(), "session paused");
            self.inner.presenter.present(&Cue::Paused);
        } else {
            info!(trial = self.current_trial(), "session resumed");
            self.inner.presenter.present(&Cue::Resumed);
        }
    }

    /// Ends the active run early and finalizes it.
    ///
    /// Returns `None` when nothing was running. Device and storage failures
    /// are carried in the report; the run is terminated either way.
    pub async fn stop(&self) -> Option<StopReport> {
        let mut was_active = false;
        self.inner.state.send_if_modified(|s| {
            if s.is_active() {
                *s = RunState::Stopped;
                was_active = true;
                true
            } else {
                false
            }
        });
        if !was_active {
            debug!("stop ignored; no active run");
            return None;
        }
        info!(trial = self.current_trial(), "stopping session");
        self.inner.checks.cancel();
        let task = {
            let mut run = lock(&self.inner.run);
            run.cancel.cancel();
            run.task.take()
        };
        if let Some(task) = task {
            if let Err(err) = task.await {
                error!(%err, "trial loop ended abnormally");
            }
        }
        match self.finish(EndReason::Stopped).await {
            Some(report) => Some(report),
            None => self.last_report().map(|report| report.stop),
        }
    }

    /// Answers the pending attention check.
    pub fn submit_answer(&self, direction: Direction) -> Result<(), SessionError> {
        self.inner.checks.submit_answer(direction)?;
        debug!(%direction, "attention answer submitted");
        Ok(())
    }

    async fn run_loop(self, mode: Mode, device_connected: bool, cancel: CancellationToken) {
        if !self.countdown(mode, &cancel).await {
            return;
        }
        loop {
            match self.run_next_trial(mode, device_connected, &cancel).await {
                Step::Continue => {}
                Step::Finished => {
                    self.finish(EndReason::Completed).await;
                    break;
                }
                Step::Halted => break,
            }
        }
    }

    async fn countdown(&self, mode: Mode, cancel: &CancellationToken) -> bool {
        let timings = &self.inner.config.timings;
        self.inner.presenter.present(&Cue::ModeAnnouncement {
            mode,
            text: mode.announcement().to_string(),
        });
        for remaining in (1..=timings.countdown_steps).rev() {
            self.inner.presenter.present(&Cue::Countdown { remaining });
            let step = self.inner.timer.delay(timings.countdown_step(), cancel).await;
            if step.is_cancelled() {
                return false;
            }
        }
        true
    }

    async fn run_next_trial(
        &self,
        mode: Mode,
        device_connected: bool,
        cancel: &CancellationToken,
    ) -> Step {
        if !self.wait_until_running(cancel).await {
            return Step::Halted;
        }
        let total = self.inner.config.total_trials();
        let (number, direction) = {
            let mut book = self.book();
            let number = if book.retry_current {
                book.trial_counter
            } else {
                book.trial_counter + 1
            };
            if number > total {
                return Step::Finished;
            }
            book.retry_current = false;
            book.trial_counter = number;
            (number, book.sequence.get(number as usize - 1).copied())
        };
        let Some(direction) = direction else {
            error!(trial = number, "direction sequence shorter than trial count");
            return Step::Finished;
        };

        let mut trial = Trial::new(number, direction);
        let machine = TrialMachine {
            timer: &self.inner.timer,
            presenter: self.inner.presenter.as_ref(),
            device: &self.inner.device,
            device_connected,
            state: &self.inner.state,
            cancel,
            timings: &self.inner.config.timings,
            mode,
            total_trials: total,
        };
        let outcome = machine.run(&mut trial, self.sample_rest()).await;

        if let TrialOutcome::Interrupted { phase, state } = outcome {
            let mut book = self.book();
            if outcome.reached_recording() {
                book.last_direction = Some(direction);
            }
            book.retry_current = state == RunState::Paused;
            info!(trial = number, %phase, %state, "trial interrupted");
            return Step::Continue;
        }

        let check_due = {
            let mut book = self.book();
            book.last_direction = Some(direction);
            match book.session.as_mut() {
                Some(session) => {
                    session.trials.push(trial);
                    session.is_check_scheduled(number)
                }
                None => false,
            }
        };
        if check_due {
            return self.run_attention_check(number, cancel).await;
        }
        Step::Continue
    }

    async fn run_attention_check(&self, trial: u32, cancel: &CancellationToken) -> Step {
        if !self.wait_until_running(cancel).await {
            return Step::Halted;
        }
        let Some(asked) = self.last_direction() else {
            warn!(trial, "attention check skipped; no direction shown yet");
            return Step::Continue;
        };
        let ctx = CheckContext {
            timer: &self.inner.timer,
            presenter: self.inner.presenter.as_ref(),
            state: &self.inner.state,
            cancel,
            config: &self.inner.config.attention,
        };
        match self.inner.checks.await_check(ctx, trial, asked).await {
            Ok(Some(result)) => {
                let mut book = self.book();
                let record = book
                    .session
                    .as_mut()
                    .and_then(|s| s.trials.iter_mut().rev().find(|t| t.number == trial));
                if let Some(record) = record {
                    record.attention_check = Some(result);
                }
                Step::Continue
            }
            Ok(None) => Step::Halted,
            Err(err) => {
                error!(trial, %err, "attention check not presented");
                Step::Continue
            }
        }
    }

    /// Waits out `Paused` and `AwaitingCheck`; false once the run is over.
    async fn wait_until_running(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.inner.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                RunState::Running => return true,
                RunState::Idle | RunState::Stopped => return false,
                RunState::Paused | RunState::AwaitingCheck => {}
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = cancel.cancelled() => return false,
            }
        }
    }

    fn sample_rest(&self) -> Duration {
        let (min, max) = self.inner.config.timings.rest_range_ms;
        let ms = lock(&self.inner.rng).random_range(min..=max);
        Duration::from_millis(ms)
    }

    /// Ends the device session, persists and announces completion.
    ///
    /// Runs at most once per run; later callers get `None`.
    async fn finish(&self, reason: EndReason) -> Option<StopReport> {
        let (mut session, device_session_active) = {
            let mut book = self.book();
            if book.finalizing {
                return None;
            }
            let session = book.session.clone()?;
            book.finalizing = true;
            (session, std::mem::take(&mut book.device_session_active))
        };
        self.inner.state.send_replace(RunState::Stopped);
        self.inner.checks.cancel();
        session.end_time = Some(Utc::now());

        let mut report = StopReport {
            reason,
            completed_trials: session.completed_trials(),
            device_session_id: session.device_session_id.clone(),
            saved_to: None,
            error: None,
        };

        let record = if device_session_active {
            match self.inner.device.end_session().await {
                Ok(mut record) => {
                    record.merge_attention_checks(&session);
                    if record.session_id.is_none() {
                        record.session_id = session.device_session_id.clone();
                    }
                    Some(record)
                }
                Err(err) => {
                    error!(%err, "device failed to end the session");
                    report.error = Some(format!("failed to end device session: {err}"));
                    None
                }
            }
        } else {
            Some(SessionRecord::from_session(&session))
        };

        if let (Some(record), Some(store)) = (record, self.inner.store.as_ref()) {
            match store.save(&record) {
                Ok(path) => report.saved_to = Some(path),
                Err(err) => {
                    error!(%err, "failed to save session");
                    report.error = Some(format!("failed to save session: {err}"));
                }
            }
        }

        let stats = self.inner.timer.timing_stats();
        info!(
            reason = ?reason,
            completed = report.completed_trials,
            total = session.total_trials,
            accuracy = ?session.attention_accuracy(),
            sleeps = stats.samples,
            overshoot_ms = stats.average_overshoot_ns / 1e6,
            jitter_ms = stats.jitter_ns / 1e6,
            "session finished"
        );
        self.inner.presenter.present(&Cue::SessionComplete {
            message: report.message(),
        });

        {
            let mut book = self.book();
            book.session = None;
            book.finalizing = false;
        }
        self.inner.finished.send_replace(Some(RunReport {
            session,
            stop: report.clone(),
        }));
        Some(report)
    }

    fn is_busy(&self) -> bool {
        self.state().is_active() || self.book().session.is_some()
    }

    fn book(&self) -> MutexGuard<'_, RunBook> {
        lock(&self.inner.book)
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
