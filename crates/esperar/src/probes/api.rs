//! HTTP API probes.
//!
//! The probe never interprets a missing record as an error: an empty
//! body or an empty result list is `Observation::Missing`, because the
//! record simply may not have propagated yet. Failure classification is
//! the transport's job: auth and client errors are fatal (retrying
//! cannot fix a bad token), server errors and network trouble are
//! transient.

use crate::probe::{EntityKey, Observation, Probe, ProbeFailure};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Fetches the raw JSON body for an entity from some HTTP API.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Fetch the response body for this key.
    ///
    /// # Errors
    ///
    /// [`ProbeFailure::Fatal`] for auth/client errors,
    /// [`ProbeFailure::Transient`] for server errors, timeouts, and
    /// connection trouble.
    async fn fetch(&self, key: &EntityKey) -> Result<Value, ProbeFailure>;

    /// Which API this transport talks to, for diagnostics
    fn endpoint(&self) -> String;
}

/// Classify an HTTP status the way a poller needs it: server-side
/// trouble is worth retrying, client-side trouble never is.
pub(crate) fn classify_status(status: u16, endpoint: &str) -> ProbeFailure {
    if status >= 500 {
        ProbeFailure::transient(format!("{endpoint} answered {status}"))
    } else {
        ProbeFailure::fatal(format!("{endpoint} answered {status}"))
    }
}

/// A probe that fetches JSON through an [`ApiTransport`] and extracts
/// the watched value from the body.
pub struct ApiProbe<T> {
    transport: Arc<dyn ApiTransport>,
    extract: Box<dyn Fn(&Value) -> Observation<T> + Send + Sync>,
    description: String,
}

impl<T> ApiProbe<T> {
    /// Probe the transport and pull the watched value out of each body.
    ///
    /// The extractor returns `Missing` when the body does not carry the
    /// value yet; it must not treat absence as an error.
    pub fn new(
        transport: Arc<dyn ApiTransport>,
        description: impl Into<String>,
        extract: impl Fn(&Value) -> Observation<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            transport,
            extract: Box::new(extract),
            description: description.into(),
        }
    }
}

impl<T> fmt::Debug for ApiProbe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiProbe")
            .field("description", &self.description)
            .field("endpoint", &self.transport.endpoint())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Clone + fmt::Debug + Send + Sync> Probe for ApiProbe<T> {
    type Value = T;

    async fn sample(&self, key: &EntityKey) -> Result<Observation<T>, ProbeFailure> {
        let body = self.transport.fetch(key).await?;
        Ok((self.extract)(&body))
    }

    fn target(&self) -> String {
        format!("{} via {}", self.description, self.transport.endpoint())
    }
}

/// reqwest-backed transport for bearer-token JSON APIs.
#[cfg(feature = "rest")]
pub use rest::RestTransport;

#[cfg(feature = "rest")]
mod rest {
    use super::{classify_status, ApiTransport, EntityKey, ProbeFailure, Value};
    use async_trait::async_trait;

    /// GETs `{base_url}{path}` with `{key}` in the path substituted and
    /// a bearer token attached.
    #[derive(Debug, Clone)]
    pub struct RestTransport {
        client: reqwest::Client,
        base_url: String,
        path_template: String,
        token: String,
    }

    impl RestTransport {
        /// Transport against this API; `path_template` may contain
        /// `{key}`, replaced per request
        #[must_use]
        pub fn new(
            base_url: impl Into<String>,
            path_template: impl Into<String>,
            token: impl Into<String>,
        ) -> Self {
            Self {
                client: reqwest::Client::new(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                path_template: path_template.into(),
                token: token.into(),
            }
        }

        fn url_for(&self, key: &EntityKey) -> String {
            let path = self.path_template.replace("{key}", key.as_str());
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    #[async_trait]
    impl ApiTransport for RestTransport {
        async fn fetch(&self, key: &EntityKey) -> Result<Value, ProbeFailure> {
            let url = self.url_for(key);
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| {
                    // timeouts and connection errors are retryable
                    ProbeFailure::transient_with(format!("request to {url} failed"), e)
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(classify_status(status.as_u16(), &self.base_url));
            }

            let text = response.text().await.map_err(|e| {
                ProbeFailure::transient_with(format!("reading body from {url} failed"), e)
            })?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text).map_err(|e| {
                ProbeFailure::fatal_with(format!("{url} returned malformed JSON"), e)
            })
        }

        fn endpoint(&self) -> String {
            self.base_url.clone()
        }
    }
}
