//! Esperar: Convergence Polling for Eventually-Consistent Test Suites
//!
//! Esperar (Spanish: "to wait/hope") replaces the fixed sleeps that make
//! end-to-end suites slow and flaky with bounded, observable polling.
//! A write lands on the primary, then fans out to a read replica, a
//! REST API cache, a batch-fed legacy API, and a rendered UI, each on
//! its own schedule. Esperar samples the surface you care about under a
//! capped exponential backoff until your condition holds, attempts run
//! out, or the run is cancelled.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ESPERAR Architecture                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   ┌───────────┐   ┌──────────────────────────┐  │
//! │  │ Probe   │──►│ Poller    │──►│ ConvergencePredicate     │  │
//! │  │ (API/DB │   │ (backoff, │   │ (count ↑, value present, │  │
//! │  │  /UI)   │   │  cancel)  │   │  row rendered, ...)      │  │
//! │  └─────────┘   └───────────┘   └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use esperar::{BackoffSchedule, CountIncreased, EntityKey, Poller, ScriptedProbe};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> esperar::EsperarResult<()> {
//! // replica counts observed over three attempts; baseline was 5
//! let probe = ScriptedProbe::of_values(vec![5u64, 5, 6]);
//! let outcome = Poller::new()
//!     .run(
//!         &probe,
//!         &CountIncreased,
//!         &BackoffSchedule::new(1, 5),
//!         &EntityKey::from("colab-42"),
//!         Some(&5),
//!     )
//!     .await?
//!     .require_converged()?;
//! assert_eq!(outcome.attempts, 3);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod backoff;
pub mod cancel;
pub mod config;
pub mod context;
pub mod outcome;
pub mod poller;
pub mod predicate;
pub mod probe;
pub mod probes;
pub mod result;
pub mod timeline;
pub mod waits;

pub use backoff::{
    BackoffSchedule, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MULTIPLIER,
};
pub use cancel::CancelToken;
pub use config::{SuiteConfig, ENV_API_TOKEN, ENV_API_URL, ENV_LEGACY_API_URL};
pub use context::SuiteContext;
pub use outcome::{ExhaustionReason, PollOutcome};
pub use poller::Poller;
pub use predicate::{
    CollectionContains, ConvergencePredicate, CountIncreased, FnPredicate, ValueEquals,
    ValuePresent,
};
pub use probe::{EntityKey, Observation, Probe, ProbeFailure, ScriptedProbe};
pub use probes::api::{ApiProbe, ApiTransport};
#[cfg(feature = "rest")]
pub use probes::api::RestTransport;
pub use probes::db::{CountQuery, DbCountProbe, QueryExecutor};
pub use probes::ui::{UiDriver, UiRowProbe, UiVisibilityProbe};
pub use result::{EsperarError, EsperarResult};
pub use timeline::{SimulatedTimeline, SystemTimeline, Timeline};
pub use waits::{
    wait_for_absence, wait_for_pending_request, wait_for_replica_sync, wait_for_row,
    wait_for_visible,
};
