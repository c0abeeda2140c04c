#![forbid(unsafe_code)]

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock source. Timestamps are seconds since the Unix epoch as `f64`
/// because they end up verbatim in exported files.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;

    async fn sleep(&self, duration: Duration);
}

/// Local wall-clock time for epoch seconds as handed out by a [`Clock`].
pub fn to_local(epoch_secs: f64) -> DateTime<Local> {
    DateTime::from_timestamp_millis((epoch_secs * 1000.0).round() as i64)
        .map(|utc| utc.with_timezone(&Local))
        .unwrap_or_else(Local::now)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when told to. `sleep` advances it instead of
/// waiting.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, now: f64) {
        self.bits.store(now.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.set(self.now() + secs);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration.as_secs_f64());
        tokio::task::yield_now().await;
    }
}
