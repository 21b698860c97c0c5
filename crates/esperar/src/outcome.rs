//! Poll outcomes and the exhaustion/convergence distinction.

use crate::probe::{EntityKey, ProbeFailure};
use crate::result::{EsperarError, EsperarResult};
use std::fmt::Debug;
use std::time::Duration;

/// Why a poll ended without converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionReason {
    /// Every scheduled attempt was spent without the condition holding
    AttemptsExhausted,
    /// The cancel token fired before convergence
    Cancelled,
}

/// The result of a completed poll run.
///
/// Exhaustion is a first-class outcome, not an error: the poller reports
/// what it observed and lets the caller decide whether non-convergence is
/// fatal. Call [`PollOutcome::require_converged`] when it is.
#[derive(Debug)]
pub struct PollOutcome<T> {
    /// Did the predicate hold before attempts ran out
    pub converged: bool,
    /// The last observed value, if the probe ever found one
    pub value: Option<T>,
    /// Attempts actually spent (at least 1 unless cancelled up front)
    pub attempts: u32,
    /// Wall-clock time from first sample to completion
    pub elapsed: Duration,
    /// Present when `converged` is false
    pub reason: Option<ExhaustionReason>,
    /// The entity the poll was keyed on
    pub key: EntityKey,
    /// Human description of the awaited condition
    pub waiting_for: String,
    /// The last transient failure seen along the way, if any
    pub last_failure: Option<ProbeFailure>,
}

impl<T: Debug> PollOutcome<T> {
    /// Convert non-convergence into a typed error.
    ///
    /// This is the default caller policy: a converged outcome passes
    /// through unchanged, an exhausted one becomes
    /// [`EsperarError::ConvergenceTimeout`] and a cancelled one becomes
    /// [`EsperarError::Cancelled`], each carrying the attempt count,
    /// elapsed time, and the last observed value.
    pub fn require_converged(self) -> EsperarResult<Self> {
        if self.converged {
            return Ok(self);
        }
        match self.reason {
            Some(ExhaustionReason::Cancelled) => Err(EsperarError::Cancelled {
                waiting_for: self.waiting_for,
                key: self.key.to_string(),
                attempts: self.attempts,
            }),
            _ => Err(EsperarError::ConvergenceTimeout {
                waiting_for: self.waiting_for,
                key: self.key.to_string(),
                attempts: self.attempts,
                elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
                last_observed: match &self.value {
                    Some(v) => format!("{v:?}"),
                    None => "nothing".to_string(),
                },
                last_transient: self.last_failure,
            }),
        }
    }
}
