//! The convergence poller: sample, evaluate, back off, repeat.

use crate::backoff::BackoffSchedule;
use crate::cancel::CancelToken;
use crate::outcome::{ExhaustionReason, PollOutcome};
use crate::predicate::ConvergencePredicate;
use crate::probe::{EntityKey, Observation, Probe, ProbeFailure};
use crate::result::{EsperarError, EsperarResult};
use crate::timeline::{SystemTimeline, Timeline};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives a [`Probe`] against a [`ConvergencePredicate`] under a
/// [`BackoffSchedule`] until the condition holds, attempts run out, or
/// the cancel token fires.
///
/// Each poll run is single-flight: one sample in flight at a time, the
/// predicate evaluated on the fresh observation, then a capped
/// exponential delay before the next attempt. No delay is spent after
/// the final attempt or after convergence.
#[derive(Debug, Clone)]
pub struct Poller {
    timeline: Arc<dyn Timeline>,
    cancel: CancelToken,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller {
    /// Poller on the real clock with a fresh cancel token
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeline: Arc::new(SystemTimeline::new()),
            cancel: CancelToken::new(),
        }
    }

    /// Poller on the given timeline (tests inject a simulated one)
    #[must_use]
    pub fn with_timeline(timeline: Arc<dyn Timeline>) -> Self {
        Self {
            timeline,
            cancel: CancelToken::new(),
        }
    }

    /// Share an existing cancel token across several pollers
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that cancels this poller's runs
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Poll until the predicate holds for the keyed entity.
    ///
    /// Returns `Ok` for convergence, exhaustion, and cancellation alike;
    /// the outcome says which. Only configuration errors and fatal probe
    /// failures surface as `Err`.
    ///
    /// # Errors
    ///
    /// [`EsperarError::InvalidArgument`] if the schedule or key is
    /// rejected before the first sample, [`EsperarError::ProbeFatal`] if
    /// a sample fails with a non-retryable failure.
    pub async fn run<P, C>(
        &self,
        probe: &P,
        predicate: &C,
        schedule: &BackoffSchedule,
        key: &EntityKey,
        baseline: Option<&P::Value>,
    ) -> EsperarResult<PollOutcome<P::Value>>
    where
        P: Probe,
        C: ConvergencePredicate<P::Value>,
    {
        schedule.validate()?;
        if key.is_empty() {
            return Err(EsperarError::invalid("entity key must not be empty"));
        }

        let waiting_for = predicate.description();
        let target = probe.target();
        let started = self.timeline.now();
        let mut last_value: Option<P::Value> = None;
        let mut last_failure: Option<ProbeFailure> = None;

        debug!(
            target_system = %target,
            key = %key,
            waiting_for = %waiting_for,
            max_attempts = schedule.max_attempts,
            "poll starting"
        );

        for attempt in 1..=schedule.max_attempts {
            if self.cancel.is_cancelled() {
                return Ok(self.finish(
                    false,
                    last_value,
                    attempt - 1,
                    started,
                    Some(ExhaustionReason::Cancelled),
                    key,
                    &waiting_for,
                    last_failure,
                ));
            }

            let observation = match probe.sample(key).await {
                Ok(obs) => obs,
                Err(failure) if failure.is_fatal() => {
                    return Err(EsperarError::ProbeFatal {
                        target,
                        key: key.to_string(),
                        attempt,
                        source: failure,
                    });
                }
                Err(failure) => {
                    warn!(
                        target_system = %target,
                        key = %key,
                        attempt,
                        error = %failure,
                        "transient probe failure, will retry"
                    );
                    last_failure = Some(failure);
                    Observation::Missing
                }
            };

            let satisfied = predicate.is_satisfied(&observation, baseline);
            debug!(
                target_system = %target,
                key = %key,
                attempt,
                found = observation.is_found(),
                satisfied,
                "sample taken"
            );

            if let Some(value) = observation.into_value() {
                last_value = Some(value);
            }

            if satisfied {
                let outcome =
                    self.finish(true, last_value, attempt, started, None, key, &waiting_for, last_failure);
                info!(
                    target_system = %target,
                    key = %key,
                    attempts = attempt,
                    elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
                    "converged"
                );
                return Ok(outcome);
            }

            if attempt < schedule.max_attempts {
                let delay = schedule.delay_for(attempt)?;
                tokio::select! {
                    () = self.timeline.sleep(delay) => {}
                    () = self.cancel.cancelled() => {
                        return Ok(self.finish(
                            false,
                            last_value,
                            attempt,
                            started,
                            Some(ExhaustionReason::Cancelled),
                            key,
                            &waiting_for,
                            last_failure,
                        ));
                    }
                }
            }
        }

        let outcome = self.finish(
            false,
            last_value,
            schedule.max_attempts,
            started,
            Some(ExhaustionReason::AttemptsExhausted),
            key,
            &waiting_for,
            last_failure,
        );
        warn!(
            target_system = %target,
            key = %key,
            attempts = outcome.attempts,
            elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            "attempts exhausted without convergence"
        );
        Ok(outcome)
    }

    fn finish<T>(
        &self,
        converged: bool,
        value: Option<T>,
        attempts: u32,
        started: std::time::Duration,
        reason: Option<ExhaustionReason>,
        key: &EntityKey,
        waiting_for: &str,
        last_failure: Option<ProbeFailure>,
    ) -> PollOutcome<T> {
        PollOutcome {
            converged,
            value,
            attempts,
            elapsed: self.timeline.now().saturating_sub(started),
            reason,
            key: key.clone(),
            waiting_for: waiting_for.to_string(),
            last_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{CollectionContains, CountIncreased, ValueEquals, ValuePresent};
    use crate::probe::ScriptedProbe;
    use crate::timeline::SimulatedTimeline;
    use std::time::Duration;

    fn simulated() -> (Poller, Arc<SimulatedTimeline>) {
        let timeline = Arc::new(SimulatedTimeline::new());
        (Poller::with_timeline(timeline.clone()), timeline)
    }

    mod convergence_tests {
        use super::*;

        #[tokio::test]
        async fn test_first_sample_success_spends_no_backoff() {
            let (poller, timeline) = simulated();
            let probe = ScriptedProbe::of_values(vec![6u64]);
            let outcome = poller
                .run(
                    &probe,
                    &CountIncreased,
                    &BackoffSchedule::default(),
                    &EntityKey::from("colab-1"),
                    Some(&5),
                )
                .await
                .unwrap();
            assert!(outcome.converged);
            assert_eq!(outcome.attempts, 1);
            assert_eq!(outcome.value, Some(6));
            assert!(timeline.sleeps().is_empty());
            assert_eq!(outcome.elapsed, Duration::ZERO);
        }

        #[tokio::test]
        async fn test_count_converges_only_past_stale_baseline() {
            let (poller, _) = simulated();
            let probe = ScriptedProbe::of_values(vec![5u64, 5, 6]);
            let outcome = poller
                .run(
                    &probe,
                    &CountIncreased,
                    &BackoffSchedule::default(),
                    &EntityKey::from("colab-1"),
                    Some(&5),
                )
                .await
                .unwrap();
            assert!(outcome.converged);
            assert_eq!(outcome.attempts, 3);
            assert_eq!(probe.samples_taken(), 3);
            assert_eq!(outcome.value, Some(6));
        }

        #[tokio::test]
        async fn test_collection_converges_when_entry_appears() {
            let (poller, _) = simulated();
            let probe = ScriptedProbe::of_values(vec![
                vec![],
                vec!["Ana".to_string()],
                vec!["Ana".to_string(), "Bea".to_string()],
            ]);
            let outcome = poller
                .run(
                    &probe,
                    &CollectionContains::new("Ana"),
                    &BackoffSchedule::default(),
                    &EntityKey::from("colab-1"),
                    None,
                )
                .await
                .unwrap();
            assert!(outcome.converged);
            assert_eq!(outcome.attempts, 2);
            assert_eq!(probe.samples_taken(), 2);
        }

        #[tokio::test]
        async fn test_identical_scripts_yield_identical_outcomes() {
            let schedule = BackoffSchedule::new(100, 10);
            let key = EntityKey::from("colab-7");
            let mut results = Vec::new();
            for _ in 0..2 {
                let (poller, _) = simulated();
                let probe = ScriptedProbe::of_values(vec![1u64, 1, 1, 2]);
                let outcome = poller
                    .run(&probe, &CountIncreased, &schedule, &key, Some(&1))
                    .await
                    .unwrap();
                results.push((outcome.converged, outcome.attempts, outcome.value));
            }
            assert_eq!(results[0], results[1]);
        }
    }

    mod exhaustion_tests {
        use super::*;

        #[tokio::test]
        async fn test_exhaustion_spends_every_attempt_and_delay() {
            let (poller, timeline) = simulated();
            let schedule = BackoffSchedule::new(500, 15);
            let probe = ScriptedProbe::of_values(vec![5u64; 15]);
            let outcome = poller
                .run(&probe, &CountIncreased, &schedule, &EntityKey::from("colab-1"), Some(&5))
                .await
                .unwrap();
            assert!(!outcome.converged);
            assert_eq!(outcome.reason, Some(ExhaustionReason::AttemptsExhausted));
            assert_eq!(outcome.attempts, 15);
            assert_eq!(probe.samples_taken(), 15);
            // 14 delays slept, one after each non-final attempt
            assert_eq!(timeline.sleeps().len(), 14);
            assert_eq!(outcome.elapsed, schedule.total_backoff());
        }

        #[tokio::test]
        async fn test_exhausted_outcome_carries_last_observed_value() {
            let (poller, _) = simulated();
            let schedule = BackoffSchedule::new(100, 3);
            let probe = ScriptedProbe::of_values(vec![4u64, 5, 5]);
            let outcome = poller
                .run(&probe, &CountIncreased, &schedule, &EntityKey::from("colab-1"), Some(&5))
                .await
                .unwrap();
            assert_eq!(outcome.value, Some(5));
            let err = outcome.require_converged().unwrap_err();
            assert!(err.to_string().contains("3 attempts"));
        }

        #[tokio::test]
        async fn test_missing_never_becomes_found_without_new_sample() {
            let (poller, _) = simulated();
            let schedule = BackoffSchedule::new(100, 4);
            let probe: ScriptedProbe<String> = ScriptedProbe::new(vec![]);
            let outcome = poller
                .run(&probe, &ValuePresent, &schedule, &EntityKey::from("colab-1"), None)
                .await
                .unwrap();
            assert!(!outcome.converged);
            assert_eq!(outcome.value, None);
            assert_eq!(probe.samples_taken(), 4);
        }
    }

    mod failure_tests {
        use super::*;

        #[tokio::test]
        async fn test_transient_failures_retry_and_are_reported() {
            let (poller, _) = simulated();
            let schedule = BackoffSchedule::new(100, 3);
            let probe: ScriptedProbe<u64> = ScriptedProbe::new(vec![
                Err(ProbeFailure::transient("503 from replica")),
                Err(ProbeFailure::transient("connection reset")),
                Ok(Observation::Found(9)),
            ]);
            let outcome = poller
                .run(&probe, &ValueEquals::new(9u64), &schedule, &EntityKey::from("colab-1"), None)
                .await
                .unwrap();
            assert!(outcome.converged);
            assert_eq!(outcome.attempts, 3);
            assert!(outcome.last_failure.is_some());
        }

        #[tokio::test]
        async fn test_fatal_failure_aborts_immediately() {
            let (poller, _) = simulated();
            let schedule = BackoffSchedule::new(100, 10);
            let probe: ScriptedProbe<u64> = ScriptedProbe::new(vec![
                Ok(Observation::Missing),
                Err(ProbeFailure::fatal("401 unauthorized")),
                Ok(Observation::Found(9)),
            ]);
            let err = poller
                .run(&probe, &ValuePresent, &schedule, &EntityKey::from("colab-1"), None)
                .await
                .unwrap_err();
            match err {
                EsperarError::ProbeFatal { attempt, .. } => assert_eq!(attempt, 2),
                other => panic!("expected ProbeFatal, got {other:?}"),
            }
            assert_eq!(probe.samples_taken(), 2);
        }

        #[tokio::test]
        async fn test_timeout_error_chains_last_transient_failure() {
            let (poller, _) = simulated();
            let schedule = BackoffSchedule::new(100, 2);
            let probe: ScriptedProbe<u64> = ScriptedProbe::new(vec![
                Err(ProbeFailure::transient("gateway timeout")),
                Err(ProbeFailure::transient("gateway timeout")),
            ]);
            let err = poller
                .run(&probe, &ValuePresent, &schedule, &EntityKey::from("colab-1"), None)
                .await
                .unwrap()
                .require_converged()
                .unwrap_err();
            let source = std::error::Error::source(&err).expect("source chained");
            assert!(source.to_string().contains("gateway timeout"));
        }
    }

    mod validation_tests {
        use super::*;

        #[tokio::test]
        async fn test_invalid_schedule_is_rejected_before_sampling() {
            let (poller, _) = simulated();
            let schedule = BackoffSchedule::new(100, 0);
            let probe = ScriptedProbe::of_values(vec![1u64]);
            let err = poller
                .run(&probe, &ValuePresent, &schedule, &EntityKey::from("colab-1"), None)
                .await
                .unwrap_err();
            assert!(matches!(err, EsperarError::InvalidArgument { .. }));
            assert_eq!(probe.samples_taken(), 0);
        }

        #[tokio::test]
        async fn test_empty_key_is_rejected_before_sampling() {
            let (poller, _) = simulated();
            let probe = ScriptedProbe::of_values(vec![1u64]);
            let err = poller
                .run(
                    &probe,
                    &ValuePresent,
                    &BackoffSchedule::default(),
                    &EntityKey::from(""),
                    None,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, EsperarError::InvalidArgument { .. }));
            assert_eq!(probe.samples_taken(), 0);
        }
    }

    mod cancellation_tests {
        use super::*;

        #[tokio::test]
        async fn test_cancel_during_backoff_takes_no_further_samples() {
            // real timeline: 1ms before attempt 2, then a 60s delay the
            // cancellation is guaranteed to land inside
            let poller = Poller::new();
            let token = poller.cancel_token();
            let schedule = BackoffSchedule::new(1, 10)
                .with_multiplier(60_000.0)
                .with_max_delay_ms(60_000);
            let probe = ScriptedProbe::of_values(vec![1u64, 1, 1]);

            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                token.cancel();
            });

            let outcome = poller
                .run(&probe, &CountIncreased, &schedule, &EntityKey::from("colab-1"), Some(&1))
                .await
                .unwrap();
            assert!(!outcome.converged);
            assert_eq!(outcome.reason, Some(ExhaustionReason::Cancelled));
            assert_eq!(outcome.attempts, 2);
            assert_eq!(probe.samples_taken(), 2);
            let err = outcome.require_converged().unwrap_err();
            assert!(matches!(err, EsperarError::Cancelled { .. }));
        }

        #[tokio::test]
        async fn test_already_cancelled_takes_no_samples() {
            let (poller, _) = simulated();
            poller.cancel_token().cancel();
            let probe = ScriptedProbe::of_values(vec![1u64]);
            let outcome = poller
                .run(&probe, &ValuePresent, &BackoffSchedule::default(), &EntityKey::from("colab-1"), None)
                .await
                .unwrap();
            assert_eq!(outcome.reason, Some(ExhaustionReason::Cancelled));
            assert_eq!(outcome.attempts, 0);
            assert_eq!(probe.samples_taken(), 0);
        }
    }
}
