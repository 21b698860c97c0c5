//! Convergence predicates: the pure rules deciding "done".
//!
//! A predicate never retries, sleeps, or performs I/O. It looks at the
//! current observation (and an optional baseline captured before the
//! upstream action) and answers yes or no. "Not found" is simply
//! not-converged for every variant.

use crate::probe::Observation;
use std::fmt::Debug;

/// Decides whether the awaited condition holds for a probe result.
pub trait ConvergencePredicate<T>: Send + Sync {
    /// Evaluate the current observation against the optional baseline
    fn is_satisfied(&self, current: &Observation<T>, baseline: Option<&T>) -> bool;

    /// Description of the awaited condition, for error messages
    fn description(&self) -> String;
}

/// Converged once the observed value strictly exceeds the baseline.
///
/// Equality is not sufficient: an unchanged count could be a coincidence
/// of a stale baseline capture, so only `current > baseline` counts.
/// With no baseline supplied the predicate is never satisfied.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountIncreased;

impl<T: PartialOrd + Send + Sync> ConvergencePredicate<T> for CountIncreased {
    fn is_satisfied(&self, current: &Observation<T>, baseline: Option<&T>) -> bool {
        match (current.value(), baseline) {
            (Some(now), Some(before)) => now > before,
            _ => false,
        }
    }

    fn description(&self) -> String {
        "count to increase past the baseline".to_string()
    }
}

/// Converged once the probe observes any value at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValuePresent;

impl<T: Send + Sync> ConvergencePredicate<T> for ValuePresent {
    fn is_satisfied(&self, current: &Observation<T>, _baseline: Option<&T>) -> bool {
        current.is_found()
    }

    fn description(&self) -> String {
        "a value to be present".to_string()
    }
}

/// Converged once the observed value equals the expected literal.
/// A mismatch is not-converged, never an error.
#[derive(Debug, Clone)]
pub struct ValueEquals<T> {
    expected: T,
}

impl<T> ValueEquals<T> {
    /// Expect exactly this value
    pub const fn new(expected: T) -> Self {
        Self { expected }
    }
}

impl<T: PartialEq + Debug + Send + Sync> ConvergencePredicate<T> for ValueEquals<T> {
    fn is_satisfied(&self, current: &Observation<T>, _baseline: Option<&T>) -> bool {
        current.value() == Some(&self.expected)
    }

    fn description(&self) -> String {
        format!("value to equal {:?}", self.expected)
    }
}

/// Converged once a returned collection contains the target entry
/// (substring match, the way table rows carry more than the bare name).
#[derive(Debug, Clone)]
pub struct CollectionContains {
    needle: String,
}

impl CollectionContains {
    /// Look for this entry
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

impl ConvergencePredicate<Vec<String>> for CollectionContains {
    fn is_satisfied(&self, current: &Observation<Vec<String>>, _baseline: Option<&Vec<String>>) -> bool {
        current
            .value()
            .is_some_and(|items| items.iter().any(|item| item.contains(&self.needle)))
    }

    fn description(&self) -> String {
        format!("collection to contain '{}'", self.needle)
    }
}

/// A closure-based predicate for conditions the stock variants don't cover.
pub struct FnPredicate<T, F>
where
    F: Fn(&Observation<T>, Option<&T>) -> bool + Send + Sync,
{
    func: F,
    description: String,
    _marker: std::marker::PhantomData<fn(&T)>,
}

impl<T, F> FnPredicate<T, F>
where
    F: Fn(&Observation<T>, Option<&T>) -> bool + Send + Sync,
{
    /// Wrap a closure with a description for error messages
    pub fn new(func: F, description: impl Into<String>) -> Self {
        Self {
            func,
            description: description.into(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T, F> std::fmt::Debug for FnPredicate<T, F>
where
    F: Fn(&Observation<T>, Option<&T>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPredicate")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync, F> ConvergencePredicate<T> for FnPredicate<T, F>
where
    F: Fn(&Observation<T>, Option<&T>) -> bool + Send + Sync,
{
    fn is_satisfied(&self, current: &Observation<T>, baseline: Option<&T>) -> bool {
        (self.func)(current, baseline)
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}
