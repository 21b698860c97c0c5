//! Declarative waits: one call per "wait until X" a suite needs.
//!
//! Each function assembles the probe, predicate, and preset schedule for
//! one known convergence point, runs the poll, and applies the default
//! policy that non-convergence is an error.

use crate::backoff::BackoffSchedule;
use crate::poller::Poller;
use crate::predicate::{CollectionContains, CountIncreased, ValueEquals};
use crate::probe::{EntityKey, Observation};
use crate::probes::api::{ApiProbe, ApiTransport};
use crate::probes::db::{CountQuery, DbCountProbe, QueryExecutor};
use crate::probes::ui::{UiDriver, UiRowProbe, UiVisibilityProbe};
use crate::result::EsperarResult;
use serde_json::Value;
use std::sync::Arc;

/// Wait until the replica's row count for the key rises above the
/// baseline captured before the write.
///
/// # Errors
///
/// [`crate::EsperarError::ConvergenceTimeout`] when the replica never
/// catches up, plus the poller's fatal and validation errors.
pub async fn wait_for_replica_sync(
    poller: &Poller,
    executor: Arc<dyn QueryExecutor>,
    query: CountQuery,
    key: &EntityKey,
    baseline: u64,
) -> EsperarResult<u64> {
    let probe = DbCountProbe::new(executor, query);
    let outcome = poller
        .run(&probe, &CountIncreased, &BackoffSchedule::replica(), key, Some(&baseline))
        .await?
        .require_converged()?;
    Ok(outcome.value.unwrap_or(0))
}

/// Wait until the replica holds no rows for the key (deletion
/// propagated).
///
/// # Errors
///
/// Same as [`wait_for_replica_sync`].
pub async fn wait_for_absence(
    poller: &Poller,
    executor: Arc<dyn QueryExecutor>,
    query: CountQuery,
    key: &EntityKey,
) -> EsperarResult<()> {
    let probe = DbCountProbe::new(executor, query);
    poller
        .run(&probe, &ValueEquals::new(0u64), &BackoffSchedule::replica(), key, None)
        .await?
        .require_converged()?;
    Ok(())
}

/// Wait until the API's pending-request list shows more entries for the
/// requester than the baseline count.
///
/// # Errors
///
/// Fatal transport errors (bad token, client errors) and
/// [`crate::EsperarError::ConvergenceTimeout`] when the request never
/// shows up.
pub async fn wait_for_pending_request(
    poller: &Poller,
    transport: Arc<dyn ApiTransport>,
    requester_name: &str,
    key: &EntityKey,
    baseline: u64,
) -> EsperarResult<u64> {
    let name = requester_name.to_string();
    let probe = ApiProbe::new(
        transport,
        format!("pending requests for '{name}'"),
        move |body: &Value| match body.as_array() {
            Some(entries) => Observation::Found(
                entries
                    .iter()
                    .filter(|entry| {
                        entry
                            .get("requesterName")
                            .and_then(Value::as_str)
                            .is_some_and(|n| n.contains(&name))
                    })
                    .count() as u64,
            ),
            None => Observation::Missing,
        },
    );
    let outcome = poller
        .run(&probe, &CountIncreased, &BackoffSchedule::api(), key, Some(&baseline))
        .await?
        .require_converged()?;
    Ok(outcome.value.unwrap_or(0))
}

/// Wait until a table row containing the needle renders, reloading the
/// page between attempts. Returns the rows as last observed.
///
/// # Errors
///
/// [`crate::EsperarError::ConvergenceTimeout`] when the row never
/// appears, plus driver failures classified fatal.
pub async fn wait_for_row(
    poller: &Poller,
    driver: Arc<dyn UiDriver>,
    row_selector: &str,
    needle: &str,
    key: &EntityKey,
) -> EsperarResult<Vec<String>> {
    let probe = UiRowProbe::new(driver, row_selector);
    let outcome = poller
        .run(&probe, &CollectionContains::new(needle), &BackoffSchedule::ui(), key, None)
        .await?
        .require_converged()?;
    Ok(outcome.value.unwrap_or_default())
}

/// Wait until the selector matches a visible element.
///
/// # Errors
///
/// Same classification as [`wait_for_row`].
pub async fn wait_for_visible(
    poller: &Poller,
    driver: Arc<dyn UiDriver>,
    selector: &str,
    key: &EntityKey,
) -> EsperarResult<()> {
    let probe = UiVisibilityProbe::new(driver, selector);
    poller
        .run(&probe, &ValueEquals::new(true), &BackoffSchedule::ui(), key, None)
        .await?
        .require_converged()?;
    Ok(())
}
