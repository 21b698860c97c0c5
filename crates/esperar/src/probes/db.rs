//! Read-replica probes.
//!
//! The replica lags the primary by an unknown margin, so row counts are
//! compared against a baseline captured before the upstream action
//! rather than asserted absolutely.

use crate::probe::{EntityKey, Observation, Probe, ProbeFailure};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A keyed count over one table, rendered as a parameterized query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountQuery {
    /// Schema the tenant's tables live in
    pub schema: String,
    /// Table to count rows in
    pub table: String,
    /// Column the entity key matches against
    pub key_column: String,
}

impl CountQuery {
    /// Count rows in `schema.table` where `key_column` matches the key
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        key_column: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            key_column: key_column.into(),
        }
    }

    /// The query text with a `$1` placeholder for the key
    #[must_use]
    pub fn sql(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM {}.{} WHERE {} = $1",
            self.schema, self.table, self.key_column
        )
    }
}

/// Runs count queries against the replica.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute the count with the key bound as `$1`.
    ///
    /// # Errors
    ///
    /// [`ProbeFailure::Transient`] for connection or timeout trouble,
    /// [`ProbeFailure::Fatal`] for a query the database rejects.
    async fn count(&self, query: &CountQuery, key: &EntityKey) -> Result<u64, ProbeFailure>;

    /// Which database this executor talks to, for diagnostics
    fn database(&self) -> String;
}

/// A probe that samples a row count from the replica.
///
/// A count of zero is still `Found(0)`: the query answered, the rows
/// just are not there. Pair with `CountIncreased` against a baseline, or
/// `ValueEquals(0)` to wait for rows to disappear.
pub struct DbCountProbe {
    executor: Arc<dyn QueryExecutor>,
    query: CountQuery,
}

impl DbCountProbe {
    /// Probe the executor with this count query
    pub fn new(executor: Arc<dyn QueryExecutor>, query: CountQuery) -> Self {
        Self { executor, query }
    }
}

impl fmt::Debug for DbCountProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCountProbe")
            .field("query", &self.query)
            .field("database", &self.executor.database())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Probe for DbCountProbe {
    type Value = u64;

    async fn sample(&self, key: &EntityKey) -> Result<Observation<u64>, ProbeFailure> {
        let count = self.executor.count(&self.query, key).await?;
        Ok(Observation::Found(count))
    }

    fn target(&self) -> String {
        format!(
            "row count in {}.{} on {}",
            self.query.schema,
            self.query.table,
            self.executor.database()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeExecutor {
        counts: Mutex<VecDeque<Result<u64, ProbeFailure>>>,
    }

    impl FakeExecutor {
        fn new(counts: Vec<Result<u64, ProbeFailure>>) -> Arc<Self> {
            Arc::new(Self {
                counts: Mutex::new(counts.into_iter().collect()),
            })
        }
    }

    #[async_trait]
    impl QueryExecutor for FakeExecutor {
        async fn count(&self, _query: &CountQuery, _key: &EntityKey) -> Result<u64, ProbeFailure> {
            self.counts
                .lock()
                .expect("counts mutex poisoned")
                .pop_front()
                .unwrap_or(Ok(0))
        }

        fn database(&self) -> String {
            "fake replica".to_string()
        }
    }

    #[test]
    fn test_query_renders_parameterized_sql() {
        let query = CountQuery::new("hcm", "vacationperiod", "employee_id");
        assert_eq!(
            query.sql(),
            "SELECT COUNT(*) FROM hcm.vacationperiod WHERE employee_id = $1"
        );
    }

    #[tokio::test]
    async fn test_zero_count_is_found_not_missing() {
        let probe = DbCountProbe::new(
            FakeExecutor::new(vec![Ok(0)]),
            CountQuery::new("hcm", "vacationperiod", "employee_id"),
        );
        let obs = probe.sample(&EntityKey::from("colab-1")).await.unwrap();
        assert_eq!(obs.value(), Some(&0));
    }

    #[tokio::test]
    async fn test_connection_trouble_is_transient() {
        let probe = DbCountProbe::new(
            FakeExecutor::new(vec![Err(ProbeFailure::transient("replica connection reset"))]),
            CountQuery::new("hcm", "vacationperiod", "employee_id"),
        );
        let err = probe.sample(&EntityKey::from("colab-1")).await.unwrap_err();
        assert!(!err.is_fatal());
    }
}
