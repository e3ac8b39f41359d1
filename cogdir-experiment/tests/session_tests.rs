use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cogdir_core::{
    BandPower, BandPowerFrame, BrainwaveSample, Cue, Direction, Mode, RunState, Session,
    SessionRecord, TrialRecord,
};
use cogdir_experiment::{
    Credentials, DeviceAdapter, DeviceError, EndReason, ExperimentConfig, Paradigm, Presenter,
    SessionController, SessionError, SessionInfo, SessionStore, TrialInfo,
};
use tokio::sync::mpsc;

type CallLog = Arc<Mutex<Vec<String>>>;

/// Headset double that records every call.
struct RecordingDevice {
    log: CallLog,
    fail_session_start: bool,
    fail_trials: bool,
    fail_end_session: bool,
    mode: Option<Mode>,
    session_id: Option<String>,
    open: Option<TrialRecord>,
    trials: Vec<TrialRecord>,
}

impl RecordingDevice {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_session_start: false,
            fail_trials: false,
            fail_end_session: false,
            mode: None,
            session_id: None,
            open: None,
            trials: Vec::new(),
        }
    }

    fn record(&self, call: String) {
        self.log.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DeviceAdapter for RecordingDevice {
    async fn connect(&mut self, _credentials: &Credentials) -> Result<(), DeviceError> {
        self.record("connect".into());
        Ok(())
    }

    async fn start_session(&mut self, info: &SessionInfo) -> Result<String, DeviceError> {
        self.record("start_session".into());
        if self.fail_session_start {
            return Err(DeviceError::Rejected("headset busy".into()));
        }
        self.mode = Some(info.mode);
        self.session_id = Some("sess-1".into());
        Ok("sess-1".into())
    }

    async fn start_trial(&mut self, info: &TrialInfo) -> Result<(), DeviceError> {
        self.record(format!("start_trial:{}:{}", info.trial_number, info.direction));
        if self.fail_trials {
            return Err(DeviceError::Transport("link dropped".into()));
        }
        self.open = Some(TrialRecord {
            trial_number: Some(info.trial_number),
            direction: info.direction,
            start_time: info.timestamp,
            end_time: None,
            brainwaves: Vec::new(),
            attention_check: None,
        });
        Ok(())
    }

    async fn end_trial(&mut self) -> Result<(), DeviceError> {
        self.record("end_trial".into());
        if self.fail_trials {
            return Err(DeviceError::Transport("link dropped".into()));
        }
        let mut trial = self.open.take().ok_or(DeviceError::NoActiveTrial)?;
        trial.end_time = Some(Utc::now());
        trial.brainwaves.push(BrainwaveSample {
            timestamp: Utc::now().timestamp_millis(),
            data: BandPowerFrame {
                data: vec![BandPower::from_values([1.0, 2.0, 3.0, 4.0, 5.0])],
            },
        });
        self.trials.push(trial);
        Ok(())
    }

    async fn end_session(&mut self) -> Result<SessionRecord, DeviceError> {
        self.record("end_session".into());
        if self.fail_end_session {
            return Err(DeviceError::Transport("upload failed".into()));
        }
        let mode = self.mode.ok_or(DeviceError::NoActiveSession)?;
        let mut record = SessionRecord::new(mode, Utc::now());
        record.session_id = self.session_id.take();
        record.trials = std::mem::take(&mut self.trials);
        Ok(record)
    }
}

/// Forwards every cue to the test body.
struct ChannelPresenter(mpsc::UnboundedSender<Cue>);

impl Presenter for ChannelPresenter {
    fn present(&self, cue: &Cue) {
        let _ = self.0.send(cue.clone());
    }
}

fn config(total: u32, check_probability: f64) -> ExperimentConfig {
    let mut config = ExperimentConfig {
        paradigm: Paradigm::FourDirection {
            total_trials: total,
        },
        seed: Some(42),
        ..Default::default()
    };
    config.attention.check_probability = check_probability;
    config
}

fn controller(config: ExperimentConfig) -> (SessionController, mpsc::UnboundedReceiver<Cue>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = SessionController::builder(config)
        .presenter(ChannelPresenter(tx))
        .build()
        .unwrap();
    (controller, rx)
}

async fn attach(controller: &SessionController, device: RecordingDevice) {
    controller
        .connect_device(Box::new(device), &Credentials::new("dev-1", "a@b.c", "pw"))
        .await
        .unwrap();
}

fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Drains cues until the session completes, answering checks with `answer`.
async fn drive(
    controller: &SessionController,
    cues: &mut mpsc::UnboundedReceiver<Cue>,
    mut answer: impl FnMut(Direction) -> Direction,
) -> Vec<Cue> {
    let mut seen = Vec::new();
    while let Some(cue) = cues.recv().await {
        if let Cue::AttentionCheck { .. } = cue {
            let asked = controller.last_direction().unwrap();
            controller.submit_answer(answer(asked)).unwrap();
        }
        let done = matches!(cue, Cue::SessionComplete { .. });
        seen.push(cue);
        if done {
            break;
        }
    }
    seen
}

fn other_than(direction: Direction) -> Direction {
    match direction {
        Direction::Up => Direction::Down,
        _ => Direction::Up,
    }
}

/// connect, start_session, one start/end pair per trial, end_session.
fn expected_calls(session: &Session) -> Vec<String> {
    ["connect".to_string(), "start_session".to_string()]
        .into_iter()
        .chain(session.trials.iter().flat_map(|t| {
            [
                format!("start_trial:{}:{}", t.number, t.direction),
                "end_trial".to_string(),
            ]
        }))
        .chain(std::iter::once("end_session".to_string()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn device_calls_follow_trial_order() {
    let log = CallLog::default();
    let (controller, mut cues) = controller(config(3, 0.0));
    attach(&controller, RecordingDevice::new(log.clone())).await;

    controller.start_with(Mode::InnerSpeech).await.unwrap();
    drive(&controller, &mut cues, |d| d).await;
    let report = controller.wait_finished().await.unwrap();

    let session = &report.session;
    assert_eq!(calls(&log), expected_calls(session));
    assert_eq!(
        session.trials.iter().map(|t| t.number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(report.stop.reason, EndReason::Completed);
    assert_eq!(report.stop.device_session_id.as_deref(), Some("sess-1"));
    assert_eq!(controller.state(), RunState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn cues_follow_phase_order_within_a_trial() {
    let (controller, mut cues) = controller(config(1, 0.0));
    controller.start_with(Mode::Pronounced).await.unwrap();
    let seen = drive(&controller, &mut cues, |d| d).await;

    let labels: Vec<&str> = seen.iter().map(Cue::label).collect();
    let at = |label: &str| labels.iter().position(|l| *l == label).unwrap();
    assert_eq!(labels[0], "mode_announcement");
    assert_eq!(labels.iter().filter(|l| **l == "countdown").count(), 3);
    assert!(at("countdown") < at("progress"));
    assert!(at("rest") < at("direction"));
    assert!(at("direction") < at("action"));
    assert!(at("action") < at("relax"));
    assert!(at("relax") < at("trial_end"));
    assert_eq!(*labels.last().unwrap(), "session_complete");

    let instruction = seen.iter().find_map(|c| match c {
        Cue::Action { instruction, .. } => Some(instruction.clone()),
        _ => None,
    });
    assert!(instruction.unwrap().starts_with("Say aloud: "));
}

#[tokio::test(start_paused = true)]
async fn correct_answers_are_recorded_on_the_checked_trials() {
    let log = CallLog::default();
    let (controller, mut cues) = controller(config(3, 1.0));
    attach(&controller, RecordingDevice::new(log.clone())).await;

    controller.start_with(Mode::Visualized).await.unwrap();
    let seen = drive(&controller, &mut cues, |d| d).await;
    let report = controller.wait_finished().await.unwrap();

    assert_eq!(report.session.attention_check_trial_numbers, vec![1, 2, 3]);
    for trial in &report.session.trials {
        let check = trial.attention_check.as_ref().unwrap();
        assert!(check.correct);
        assert_eq!(check.asked_direction, trial.direction);
    }
    assert_eq!(report.session.attention_accuracy(), Some(1.0));
    let feedback = seen
        .iter()
        .filter(|c| matches!(c, Cue::AttentionFeedback { correct: true, .. }))
        .count();
    assert_eq!(feedback, 3);
    // checks sit between trials and never touch the device
    assert_eq!(calls(&log), expected_calls(&report.session));
}

#[tokio::test(start_paused = true)]
async fn device_failures_are_tolerated_and_reported() {
    let log = CallLog::default();
    let (controller, mut cues) = controller(config(3, 0.0));
    let mut device = RecordingDevice::new(log.clone());
    device.fail_trials = true;
    device.fail_end_session = true;
    attach(&controller, device).await;

    controller.start_with(Mode::InnerSpeech).await.unwrap();
    let seen = drive(&controller, &mut cues, |d| d).await;
    let report = controller.wait_finished().await.unwrap();

    assert_eq!(report.session.trials.len(), 3);
    assert!(report.session.trials.iter().all(|t| t.is_complete()));
    assert_eq!(report.stop.reason, EndReason::Completed);
    assert!(report.stop.error.is_some());
    assert!(!report.stop.data_saved());
    assert_eq!(controller.state(), RunState::Stopped);
    assert_eq!(calls(&log), expected_calls(&report.session));
    assert_eq!(
        *seen.last().unwrap(),
        Cue::SessionComplete {
            message: "Experiment completed, but there was an error saving data.".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn wrong_answer_names_the_shown_direction() {
    let (controller, mut cues) = controller(config(2, 1.0));
    controller.start_with(Mode::InnerSpeech).await.unwrap();
    let seen = drive(&controller, &mut cues, other_than).await;
    let report = controller.wait_finished().await.unwrap();

    let messages: Vec<&String> = seen
        .iter()
        .filter_map(|c| match c {
            Cue::AttentionFeedback { correct: false, message } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(messages.len(), 2);
    for (trial, message) in report.session.trials.iter().zip(messages) {
        assert_eq!(
            *message,
            format!(
                "Incorrect. The direction was {}. Please pay more attention.",
                trial.direction
            )
        );
        assert!(!trial.attention_check.as_ref().unwrap().correct);
    }
    assert_eq!(report.session.attention_accuracy(), Some(0.0));
}

#[tokio::test(start_paused = true)]
async fn forty_trials_at_default_probability_schedule_six_checks() {
    let (controller, _cues) = controller(config(40, 0.15));
    controller.start_with(Mode::InnerSpeech).await.unwrap();

    let session = controller.session().unwrap();
    assert_eq!(session.attention_check_trial_numbers.len(), 6);
    assert!(
        session
            .attention_check_trial_numbers
            .iter()
            .all(|n| (1..=40).contains(n))
    );
    assert!(controller.stop().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn failed_device_session_leaves_controller_idle() {
    let log = CallLog::default();
    let (controller, _cues) = controller(config(3, 0.0));
    let mut device = RecordingDevice::new(log.clone());
    device.fail_session_start = true;
    attach(&controller, device).await;

    let err = controller.start_with(Mode::InnerSpeech).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::SessionStart(DeviceError::Rejected(_))
    ));
    assert_eq!(controller.state(), RunState::Idle);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls(&log), vec!["connect", "start_session"]);
    assert!(controller.session().is_none());
}

#[tokio::test(start_paused = true)]
async fn start_preconditions_are_enforced() {
    let (controller, _cues) = controller(config(3, 0.0));
    assert!(matches!(
        controller.start().await,
        Err(SessionError::NoModeSelected)
    ));

    let mut strict = config(3, 0.0);
    strict.require_device = true;
    let (strict, _strict_cues) = self::controller(strict);
    strict.select_mode(Mode::Visualized).unwrap();
    assert!(matches!(
        strict.start().await,
        Err(SessionError::DeviceNotConnected)
    ));
    assert_eq!(strict.state(), RunState::Idle);

    controller.start_with(Mode::InnerSpeech).await.unwrap();
    assert!(matches!(
        controller.start().await,
        Err(SessionError::AlreadyRunning)
    ));
    assert!(matches!(
        controller.select_mode(Mode::Pronounced),
        Err(SessionError::InvalidState { .. })
    ));
    controller.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_ends_the_device_session_once() {
    let log = CallLog::default();
    let (controller, _cues) = controller(config(10, 0.0));
    attach(&controller, RecordingDevice::new(log.clone())).await;
    controller.start_with(Mode::InnerSpeech).await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    let report = controller.stop().await.unwrap();
    assert_eq!(report.reason, EndReason::Stopped);
    assert!(report.completed_trials < 10);
    assert_eq!(controller.state(), RunState::Stopped);

    assert!(controller.stop().await.is_none());
    let log = calls(&log);
    assert_eq!(log.iter().filter(|c| *c == "end_session").count(), 1);
    assert_eq!(log.last().map(String::as_str), Some("end_session"));
}

#[tokio::test(start_paused = true)]
async fn pause_mid_trial_reruns_the_trial_on_resume() {
    let log = CallLog::default();
    let (controller, mut cues) = controller(config(6, 0.0));
    attach(&controller, RecordingDevice::new(log.clone())).await;
    controller.start_with(Mode::InnerSpeech).await.unwrap();

    let mut current = 0;
    while let Some(cue) = cues.recv().await {
        match cue {
            Cue::Progress { trial, .. } => current = trial,
            Cue::Action { .. } if current == 5 => break,
            _ => {}
        }
    }
    assert_eq!(controller.pause().unwrap(), RunState::Paused);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let paused_log = calls(&log);
    let starts = paused_log.iter().filter(|c| c.starts_with("start_trial")).count();
    let ends = paused_log.iter().filter(|c| *c == "end_trial").count();
    assert_eq!((starts, ends), (5, 4));
    assert_eq!(controller.state(), RunState::Paused);

    controller.start().await.unwrap();
    assert_eq!(controller.state(), RunState::Running);
    drive(&controller, &mut cues, |d| d).await;
    let report = controller.wait_finished().await.unwrap();

    let numbers: Vec<u32> = report.session.trials.iter().map(|t| t.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    let log = calls(&log);
    let fifth = format!("start_trial:5:{}", report.session.trials[4].direction);
    assert_eq!(log.iter().filter(|c| **c == fifth).count(), 2);
    assert_eq!(log.iter().filter(|c| *c == "end_trial").count(), 6);
}

#[tokio::test(start_paused = true)]
async fn pause_is_rejected_while_a_check_is_pending() {
    let (controller, mut cues) = controller(config(1, 1.0));
    controller.start_with(Mode::InnerSpeech).await.unwrap();

    while let Some(cue) = cues.recv().await {
        if let Cue::AttentionCheck { trial } = cue {
            assert_eq!(trial, 1);
            break;
        }
    }
    assert_eq!(controller.state(), RunState::AwaitingCheck);
    assert!(controller.is_check_pending());
    assert!(matches!(
        controller.pause(),
        Err(SessionError::InvalidState {
            state: RunState::AwaitingCheck,
            ..
        })
    ));

    let asked = controller.last_direction().unwrap();
    controller.submit_answer(asked).unwrap();
    assert!(matches!(
        controller.submit_answer(asked),
        Err(SessionError::Attention(_))
    ));
    let report = controller.wait_finished().await.unwrap();
    assert_eq!(report.stop.reason, EndReason::Completed);
}

#[tokio::test(start_paused = true)]
async fn stop_during_a_check_abandons_it() {
    let (controller, mut cues) = controller(config(3, 1.0));
    controller.start_with(Mode::Visualized).await.unwrap();

    while let Some(cue) = cues.recv().await {
        if matches!(cue, Cue::AttentionCheck { .. }) {
            break;
        }
    }
    let report = controller.stop().await.unwrap();
    assert_eq!(report.reason, EndReason::Stopped);
    assert_eq!(report.completed_trials, 1);
    assert!(!controller.is_check_pending());

    let session = controller.session().unwrap();
    assert!(session.trials[0].attention_check.is_none());
}

#[tokio::test(start_paused = true)]
async fn session_without_device_is_saved_to_the_store() {
    let tmp = tempfile::tempdir().unwrap();
    let (tx, mut cues) = mpsc::unbounded_channel();
    let controller = SessionController::builder(config(2, 0.0))
        .presenter(ChannelPresenter(tx))
        .store(SessionStore::new(tmp.path().join("raw")))
        .build()
        .unwrap();

    controller.start_with(Mode::Pronounced).await.unwrap();
    let seen = drive(&controller, &mut cues, |d| d).await;
    let report = controller.wait_finished().await.unwrap();

    let path = report.stop.saved_to.clone().unwrap();
    assert!(report.stop.data_saved());
    let name = path.file_name().unwrap().to_str().unwrap().to_owned();
    assert!(name.starts_with("pronounced-session-"));
    let record = SessionStore::load(&path).unwrap();
    assert_eq!(record.trials.len(), 2);
    assert_eq!(record.mode, Mode::Pronounced);

    let closing = seen.last().unwrap();
    assert_eq!(
        *closing,
        Cue::SessionComplete {
            message: format!("Experiment completed. Data saved to: {}", path.display())
        }
    );
}

#[tokio::test(start_paused = true)]
async fn a_new_run_can_start_after_the_previous_one_finished() {
    let (controller, mut cues) = controller(config(1, 0.0));
    controller.start_with(Mode::InnerSpeech).await.unwrap();
    drive(&controller, &mut cues, |d| d).await;
    controller.wait_finished().await.unwrap();

    controller.start_with(Mode::Visualized).await.unwrap();
    drive(&controller, &mut cues, |d| d).await;
    let second = controller.wait_finished().await.unwrap();
    assert_eq!(second.session.mode, Mode::Visualized);
    assert_eq!(second.session.trials.len(), 1);
}
