//! Bounded exponential backoff schedules.
//!
//! Downstream systems (DB replication, legacy batch integration) have
//! unknown, variable settle time: linear backoff wastes the early attempts
//! and uncapped exponential backoff has unbounded wall-clock cost. A capped
//! exponential schedule bounds the worst case to
//! `max_attempts × max_delay` while still probing aggressively at first.

use crate::result::{EsperarError, EsperarResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base delay between attempts (500ms)
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default growth factor per attempt
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default delay cap (10 seconds)
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Default attempt budget
pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;

/// Immutable attempt→delay map: `delay(n) = min(base × multiplier^(n-1), cap)`.
///
/// Constructed once per poll call; the schedule itself never sleeps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffSchedule {
    /// Delay before the second attempt, in milliseconds
    pub base_delay_ms: u64,
    /// Growth factor per attempt (must be > 1)
    pub multiplier: f64,
    /// Upper bound on any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Total attempt budget (must be ≥ 1)
    pub max_attempts: u32,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffSchedule {
    /// Create a schedule with the given base delay and attempt budget,
    /// keeping the default multiplier and cap
    #[must_use]
    pub fn new(base_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_delay_ms,
            max_attempts,
            ..Default::default()
        }
    }

    /// Set the growth factor
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the delay cap
    #[must_use]
    pub const fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Set the attempt budget
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Schedule tuned for API pendency checks: 500ms doubling to a 10s cap
    #[must_use]
    pub const fn api() -> Self {
        Self {
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            max_attempts: 20,
        }
    }

    /// Schedule tuned for replica/batch integration waits: 2s doubling to
    /// an 8s cap; the downstream sync rarely lands inside the first
    /// couple of seconds, so probing faster than this is wasted load
    #[must_use]
    pub const fn replica() -> Self {
        Self {
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 8_000,
            max_attempts: 15,
        }
    }

    /// Schedule tuned for UI re-render waits after reload: 1.2s doubling
    /// to a 5s cap
    #[must_use]
    pub const fn ui() -> Self {
        Self {
            base_delay_ms: 1_200,
            multiplier: 2.0,
            max_delay_ms: 5_000,
            max_attempts: 20,
        }
    }

    /// Delay to apply after the given attempt (1-based).
    ///
    /// # Errors
    ///
    /// Returns [`EsperarError::InvalidArgument`] for `attempt == 0`.
    pub fn delay_for(&self, attempt: u32) -> EsperarResult<Duration> {
        if attempt < 1 {
            return Err(EsperarError::invalid("attempt numbers start at 1"));
        }
        let exp = (self.base_delay_ms as f64) * self.multiplier.powi(attempt as i32 - 1);
        let capped = if exp.is_finite() {
            (exp as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        };
        Ok(Duration::from_millis(capped))
    }

    /// Total sleep time a fully exhausted poll will spend in backoff:
    /// the sum of `delay_for(1..max_attempts)`. There is no delay after
    /// the final attempt.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|a| self.delay_for(a).unwrap_or_default())
            .sum()
    }

    /// Check the schedule is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`EsperarError::InvalidArgument`] if the base delay is zero,
    /// the multiplier is not greater than 1, or the attempt budget is zero.
    pub fn validate(&self) -> EsperarResult<()> {
        if self.max_attempts < 1 {
            return Err(EsperarError::invalid("max_attempts must be at least 1"));
        }
        if self.base_delay_ms == 0 {
            return Err(EsperarError::invalid("base_delay_ms must be positive"));
        }
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(EsperarError::invalid("multiplier must be greater than 1"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(EsperarError::invalid(
                "max_delay_ms must not be below base_delay_ms",
            ));
        }
        Ok(())
    }
}
