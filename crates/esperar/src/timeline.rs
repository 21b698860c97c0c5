//! Injectable time source for the poller.
//!
//! Production polls sleep on the tokio timer; tests swap in
//! [`SimulatedTimeline`] so backoff sequences totalling minutes run in
//! microseconds while every requested delay stays observable.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of now() and sleep() for a poll run.
#[async_trait]
pub trait Timeline: Send + Sync + std::fmt::Debug {
    /// Monotonic time elapsed since this timeline started
    fn now(&self) -> Duration;

    /// Suspend until the delay has passed
    async fn sleep(&self, delay: Duration);
}

/// Real wall-clock timeline backed by the tokio timer.
#[derive(Debug)]
pub struct SystemTimeline {
    start: Instant,
}

impl SystemTimeline {
    /// Start a timeline at the current instant
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTimeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Timeline for SystemTimeline {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Simulated timeline: sleeps complete instantly and advance the clock
/// by exactly the requested delay, which is also recorded for assertions.
#[derive(Debug, Default)]
pub struct SimulatedTimeline {
    now_ms: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
}

impl SimulatedTimeline {
    /// Start a simulated timeline at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay that was requested, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Timeline for SimulatedTimeline {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    async fn sleep(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(delay);
        }
        tokio::task::yield_now().await;
    }
}
