//! Probe abstraction: a single asynchronous read against one external
//! system, used to test for convergence.
//!
//! Probes are stateless across invocations (baselines live with the
//! caller, not inside the probe) and each `sample` call is fully
//! self-contained (collaborators acquire and release their own
//! connections per call).

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Identifies the entity whose downstream effect is being awaited:
/// an employee id, a table name, a requester name, a notification id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey(String);

impl EntityKey {
    /// Create a key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is empty (a caller error for every probe variant)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for EntityKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// What a probe saw: either a value, or an explicit "not there yet"
/// sentinel. Missing is the normal not-converged case, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    /// The awaited data was present
    Found(T),
    /// Nothing there yet
    Missing,
}

impl<T> Observation<T> {
    /// Whether a value was observed
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Borrow the observed value, if any
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Found(v) => Some(v),
            Self::Missing => None,
        }
    }

    /// Take the observed value, if any
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::Missing => None,
        }
    }

    /// Build an observation from an `Option`
    pub fn from_option(opt: Option<T>) -> Self {
        match opt {
            Some(v) => Self::Found(v),
            None => Self::Missing,
        }
    }
}

/// Why a sample failed, classified by whether retrying can help.
///
/// Transient failures (network blip, stale render, lock contention)
/// consume an attempt and are absorbed by the retry loop. Fatal failures
/// (auth rejected, malformed query, misconfiguration) abort the poll
/// immediately with the cause surfaced.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// Retrying may help
    #[error("transient probe failure: {message}")]
    Transient {
        /// What went wrong
        message: String,
        /// Underlying cause, when one exists
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// Retrying cannot help
    #[error("fatal probe failure: {message}")]
    Fatal {
        /// What went wrong
        message: String,
        /// Underlying cause, when one exists
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ProbeFailure {
    /// A transient failure with no underlying error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// A transient failure wrapping its cause
    pub fn transient_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transient {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// A fatal failure with no underlying error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            source: None,
        }
    }

    /// A fatal failure wrapping its cause
    pub fn fatal_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Fatal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this failure aborts the poll
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// One read against an external system (API, DB replica, rendered UI).
///
/// Implementations declare the external call shape they wrap (endpoint
/// and auth header, SQL template, locator and reload trigger) as
/// configuration; the poller never sees any of it. UI variants may
/// reload the page as part of sampling; that side effect must be
/// explicit and counted (see [`crate::probes::UiRowProbe`]).
#[async_trait]
pub trait Probe: Send + Sync {
    /// The observed value type
    type Value: Clone + fmt::Debug + Send + Sync;

    /// Take one sample for the given entity key.
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeFailure`] classified transient or fatal; "not
    /// found" is `Ok(Observation::Missing)`, not an error.
    async fn sample(&self, key: &EntityKey) -> Result<Observation<Self::Value>, ProbeFailure>;

    /// What this probe reads, for diagnostics ("pending requests via
    /// legacy API", "row count in hcm.vacationperiod", ...)
    fn target(&self) -> String;
}

/// A probe that replays a scripted sequence of results, the test double
/// for deterministic poll runs. Once the script is exhausted it keeps
/// returning `Missing`.
pub struct ScriptedProbe<T> {
    script: Mutex<VecDeque<Result<Observation<T>, ProbeFailure>>>,
    samples_taken: AtomicU32,
    target: String,
}

impl<T> ScriptedProbe<T> {
    /// Create a probe replaying the given results in order
    pub fn new(script: Vec<Result<Observation<T>, ProbeFailure>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            samples_taken: AtomicU32::new(0),
            target: "scripted probe".to_string(),
        }
    }

    /// Create a probe replaying the given values, each wrapped in
    /// `Ok(Found(..))`
    pub fn of_values(values: Vec<T>) -> Self {
        Self::new(values.into_iter().map(|v| Ok(Observation::Found(v))).collect())
    }

    /// How many samples have been taken so far
    #[must_use]
    pub fn samples_taken(&self) -> u32 {
        self.samples_taken.load(Ordering::SeqCst)
    }
}

impl<T> fmt::Debug for ScriptedProbe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedProbe")
            .field("samples_taken", &self.samples_taken())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Clone + fmt::Debug + Send + Sync> Probe for ScriptedProbe<T> {
    type Value = T;

    async fn sample(&self, _key: &EntityKey) -> Result<Observation<T>, ProbeFailure> {
        self.samples_taken.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().expect("script mutex poisoned");
        script.pop_front().unwrap_or(Ok(Observation::Missing))
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod observation_tests {
        use super::*;

        #[test]
        fn test_found_carries_value() {
            let obs = Observation::Found(7u64);
            assert!(obs.is_found());
            assert_eq!(obs.value(), Some(&7));
            assert_eq!(obs.into_value(), Some(7));
        }

        #[test]
        fn test_missing_has_no_value() {
            let obs: Observation<u64> = Observation::Missing;
            assert!(!obs.is_found());
            assert_eq!(obs.value(), None);
        }

        #[test]
        fn test_from_option() {
            assert_eq!(Observation::from_option(Some(1)), Observation::Found(1));
            assert_eq!(Observation::<i32>::from_option(None), Observation::Missing);
        }
    }

    mod failure_tests {
        use super::*;

        #[test]
        fn test_classification() {
            assert!(!ProbeFailure::transient("blip").is_fatal());
            assert!(ProbeFailure::fatal("bad query").is_fatal());
        }

        #[test]
        fn test_cause_is_chained() {
            let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
            let failure = ProbeFailure::transient_with("connection dropped", io);
            let source = std::error::Error::source(&failure).unwrap();
            assert!(source.to_string().contains("reset"));
        }
    }

    mod scripted_tests {
        use super::*;

        #[tokio::test]
        async fn test_replays_in_order_then_missing() {
            let probe = ScriptedProbe::of_values(vec![5u64, 6]);
            let key = EntityKey::new("emp-1");
            assert_eq!(probe.sample(&key).await.unwrap(), Observation::Found(5));
            assert_eq!(probe.sample(&key).await.unwrap(), Observation::Found(6));
            assert_eq!(probe.sample(&key).await.unwrap(), Observation::Missing);
            assert_eq!(probe.samples_taken(), 3);
        }
    }

    #[test]
    fn test_entity_key_display_and_empty() {
        let key = EntityKey::from("emp-42");
        assert_eq!(key.to_string(), "emp-42");
        assert!(!key.is_empty());
        assert!(EntityKey::new("").is_empty());
    }
}
