//! Result and error types for Esperar.

use crate::probe::ProbeFailure;
use thiserror::Error;

/// Result type for Esperar operations
pub type EsperarResult<T> = Result<T, EsperarError>;

/// Errors that can occur while polling for convergence
#[derive(Debug, Error)]
pub enum EsperarError {
    /// Malformed poll configuration, raised before any attempt is made
    #[error("invalid poll configuration: {message}")]
    InvalidArgument {
        /// What was wrong with the configuration
        message: String,
    },

    /// A probe failed in a way retrying cannot fix (auth rejected, bad
    /// query, misconfiguration); the poll aborts immediately
    #[error("probe against {target} failed fatally for '{key}' on attempt {attempt}")]
    ProbeFatal {
        /// What the probe was reading (e.g. an endpoint or table)
        target: String,
        /// Entity key being awaited
        key: String,
        /// Attempt on which the fatal failure occurred
        attempt: u32,
        /// Underlying cause
        #[source]
        source: ProbeFailure,
    },

    /// The predicate was never satisfied within the attempt budget
    #[error(
        "no convergence on {waiting_for} for '{key}' after {attempts} attempts \
         ({elapsed_ms}ms); last observed: {last_observed}"
    )]
    ConvergenceTimeout {
        /// Human-readable description of the awaited condition
        waiting_for: String,
        /// Entity key being awaited
        key: String,
        /// Attempts made (equals the schedule's `max_attempts`)
        attempts: u32,
        /// Wall-clock (or simulated) time spent polling
        elapsed_ms: u64,
        /// Debug rendering of the last probe observation
        last_observed: String,
        /// Last transient probe failure, if the final attempts were failing
        /// rather than merely unconverged
        #[source]
        last_transient: Option<ProbeFailure>,
    },

    /// An external cancellation signal fired before convergence,
    /// distinct from a timeout so callers can tell "the system never
    /// caught up" from "the test framework pulled the plug"
    #[error("poll for {waiting_for} on '{key}' cancelled after {attempts} attempts")]
    Cancelled {
        /// Human-readable description of the awaited condition
        waiting_for: String,
        /// Entity key being awaited
        key: String,
        /// Attempts completed before cancellation
        attempts: u32,
    },
}

impl EsperarError {
    /// Shorthand for an [`EsperarError::InvalidArgument`]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
