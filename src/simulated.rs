//! In-process stand-in for the recording headset.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use cogdir_core::{
    BandPower, BandPowerFrame, BrainwaveSample, Direction, SessionRecord, TrialRecord,
};
use cogdir_experiment::{Credentials, DeviceAdapter, DeviceError, SessionInfo, TrialInfo};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, info};

const SAMPLE_INTERVAL: Duration = Duration::from_millis(250);
const CHANNELS: usize = 8;

struct OpenTrial {
    info: TrialInfo,
    opened: Instant,
}

/// Synthesizes power-by-band readings for each trial, biased by direction.
pub struct SimulatedHeadset {
    rng: StdRng,
    device_id: Option<String>,
    sessions_started: u32,
    record: Option<SessionRecord>,
    open: Option<OpenTrial>,
}

impl SimulatedHeadset {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            device_id: None,
            sessions_started: 0,
            record: None,
            open: None,
        }
    }

    fn sample(&mut self, direction: Direction, at: DateTime<Utc>) -> BrainwaveSample {
        let mut bias = [0.0; 5];
        match direction {
            Direction::Up => bias[1] = 0.4,
            Direction::Down => bias[4] = 0.4,
            Direction::Left => bias[2] = 0.4,
            Direction::Right => bias[3] = 0.4,
        }
        let base = [1.6, 1.1, 0.9, 0.6, 0.3];
        let data = (0..CHANNELS)
            .map(|_| {
                let mut values = [0.0; 5];
                for (i, v) in values.iter_mut().enumerate() {
                    *v = base[i] + bias[i] + self.rng.random_range(-0.15..0.15);
                }
                BandPower::from_values(values)
            })
            .collect();
        BrainwaveSample {
            timestamp: at.timestamp_millis(),
            data: BandPowerFrame { data },
        }
    }
}

#[async_trait]
impl DeviceAdapter for SimulatedHeadset {
    async fn connect(&mut self, credentials: &Credentials) -> Result<(), DeviceError> {
        if credentials.device_id.is_empty() {
            return Err(DeviceError::Authentication("device id is empty".into()));
        }
        self.device_id = Some(credentials.device_id.clone());
        info!(device_id = %credentials.device_id, "simulated headset connected");
        Ok(())
    }

    async fn start_session(&mut self, info: &SessionInfo) -> Result<String, DeviceError> {
        let device_id = self.device_id.as_ref().ok_or(DeviceError::NotConnected)?;
        self.sessions_started += 1;
        let id = format!("{device_id}-{}", self.sessions_started);
        let mut record = SessionRecord::new(info.mode, info.start_time);
        record.session_id = Some(id.clone());
        self.record = Some(record);
        self.open = None;
        Ok(id)
    }

    async fn start_trial(&mut self, info: &TrialInfo) -> Result<(), DeviceError> {
        if self.record.is_none() {
            return Err(DeviceError::NoActiveSession);
        }
        if let Some(replaced) = &self.open {
            debug!(trial = replaced.info.trial_number, "discarding open trial");
        }
        self.open = Some(OpenTrial {
            info: info.clone(),
            opened: Instant::now(),
        });
        Ok(())
    }

    async fn end_trial(&mut self) -> Result<(), DeviceError> {
        let open = self.open.take().ok_or(DeviceError::NoActiveTrial)?;
        let elapsed = open.opened.elapsed();
        let count = (elapsed.as_millis() / SAMPLE_INTERVAL.as_millis()).max(1) as u32;
        let brainwaves = (0..count)
            .map(|k| {
                let offset = TimeDelta::milliseconds(i64::from(k) * 250);
                self.sample(open.info.direction, open.info.timestamp + offset)
            })
            .collect();
        let end_time = open.info.timestamp
            + TimeDelta::from_std(elapsed).unwrap_or_else(|_| TimeDelta::zero());
        let record = self.record.as_mut().ok_or(DeviceError::NoActiveSession)?;
        record.trials.push(TrialRecord {
            trial_number: Some(open.info.trial_number),
            direction: open.info.direction,
            start_time: open.info.timestamp,
            end_time: Some(end_time),
            brainwaves,
            attention_check: None,
        });
        Ok(())
    }

    async fn end_session(&mut self) -> Result<SessionRecord, DeviceError> {
        self.open = None;
        let mut record = self.record.take().ok_or(DeviceError::NoActiveSession)?;
        record.end_time = Some(Utc::now());
        Ok(record)
    }
}
