use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a delay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    Elapsed,
    Cancelled,
}

impl DelayOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DelayOutcome::Cancelled)
    }
}

/// Trait for the clocks that drive phase delays.
pub trait Timer: Clone + Send + Sync + 'static {
    type Timestamp: Copy + Clone + Send + Sync;

    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration) -> impl Future<Output = ()> + Send;
    fn timing_stats(&self) -> TimingStats;

    /// Sleeps for `d` unless `cancel` fires first.
    fn delay(
        &self,
        d: Duration,
        cancel: &CancellationToken,
    ) -> impl Future<Output = DelayOutcome> + Send {
        async move {
            if cancel.is_cancelled() {
                return DelayOutcome::Cancelled;
            }
            tokio::select! {
                _ = self.sleep(d) => DelayOutcome::Elapsed,
                _ = cancel.cancelled() => DelayOutcome::Cancelled,
            }
        }
    }
}

/// Overshoot of completed sleeps past their requested duration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingStats {
    pub samples: usize,
    pub average_overshoot_ns: f64,
    pub jitter_ns: f64,
    pub min_overshoot_ns: f64,
    pub max_overshoot_ns: f64,
}

impl TimingStats {
    pub fn from_overshoots(overshoots: &[Duration]) -> Self {
        let times: Vec<f64> = overshoots.iter().map(|d| d.as_nanos() as f64).collect();
        if times.is_empty() {
            return Self::default();
        }
        let sum: f64 = times.iter().sum();
        let avg = sum / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            samples: times.len(),
            average_overshoot_ns: avg,
            jitter_ns: var.sqrt(),
            min_overshoot_ns: min,
            max_overshoot_ns: max,
        }
    }
}

/// Timer backed by the tokio clock.
///
/// Under `tokio::time::pause` the clock is virtual, so timed phases complete
/// instantly in tests while keeping their logical durations.
#[derive(Debug, Clone)]
pub struct TokioTimer {
    start: Instant,
    overshoots: Arc<Mutex<Vec<Duration>>>,
    max_samples: usize,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            overshoots: Arc::new(Mutex::new(Vec::with_capacity(256))),
            max_samples: 1000,
        }
    }

    fn record_overshoot(&self, d: Duration) {
        let mut overshoots = self.overshoots.lock().unwrap_or_else(|e| e.into_inner());
        if overshoots.len() >= self.max_samples {
            overshoots.remove(0);
        }
        overshoots.push(d);
    }
}

impl Default for TokioTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for TokioTimer {
    /// Nanoseconds since the timer was created.
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration) -> impl Future<Output = ()> + Send {
        async move {
            let requested = Instant::now() + d;
            tokio::time::sleep_until(requested).await;
            self.record_overshoot(Instant::now().saturating_duration_since(requested));
        }
    }

    fn timing_stats(&self) -> TimingStats {
        let overshoots = self.overshoots.lock().unwrap_or_else(|e| e.into_inner());
        TimingStats::from_overshoots(&overshoots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_virtual_clock() {
        let timer = TokioTimer::new();
        let before = timer.now();
        timer.sleep(Duration::from_millis(2500)).await;
        assert!(timer.elapsed(before) >= Duration::from_millis(2500));
        assert_eq!(timer.timing_stats().samples, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_returns_early_when_cancelled() {
        let timer = TokioTimer::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let before = timer.now();
        let outcome = timer.delay(Duration::from_secs(60), &cancel).await;
        assert_eq!(outcome, DelayOutcome::Cancelled);
        assert!(timer.elapsed(before) < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_skips_sleep_when_already_cancelled() {
        let timer = TokioTimer::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(timer.delay(Duration::from_secs(1), &cancel).await.is_cancelled());
        assert_eq!(timer.timing_stats().samples, 0);
    }

    #[test]
    fn stats_summarise_overshoots() {
        let stats = TimingStats::from_overshoots(&[
            Duration::from_nanos(100),
            Duration::from_nanos(300),
        ]);
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.average_overshoot_ns, 200.0);
        assert_eq!(stats.jitter_ns, 100.0);
        assert_eq!(stats.min_overshoot_ns, 100.0);
        assert_eq!(stats.max_overshoot_ns, 300.0);
    }
}
