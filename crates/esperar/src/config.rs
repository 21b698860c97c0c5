//! Suite configuration: endpoints, credentials, tenant.

use crate::result::{EsperarError, EsperarResult};
use serde::{Deserialize, Serialize};

/// Environment variable holding the primary API base URL
pub const ENV_API_URL: &str = "BASE_API";

/// Environment variable holding the legacy API base URL
pub const ENV_LEGACY_API_URL: &str = "BASE_API_LEGADO";

/// Environment variable holding the bearer token
pub const ENV_API_TOKEN: &str = "API_TOKEN";

/// Everything the probes need to reach the systems under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Primary API base URL
    pub api_url: String,
    /// Legacy API base URL (batch-fed, slowest to converge)
    pub legacy_api_url: String,
    /// Bearer token both APIs accept
    pub api_token: String,
    /// Schema the tenant's tables live in on the replica
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_schema() -> String {
    "hcm".to_string()
}

impl SuiteConfig {
    /// Build a config from explicit values
    pub fn new(
        api_url: impl Into<String>,
        legacy_api_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            legacy_api_url: legacy_api_url.into(),
            api_token: api_token.into(),
            schema: default_schema(),
        }
    }

    /// Override the replica schema
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Read the config from the environment.
    ///
    /// # Errors
    ///
    /// [`EsperarError::InvalidArgument`] naming the first variable that
    /// is missing or empty.
    pub fn from_env() -> EsperarResult<Self> {
        Ok(Self {
            api_url: require_env(ENV_API_URL)?,
            legacy_api_url: require_env(ENV_LEGACY_API_URL)?,
            api_token: require_env(ENV_API_TOKEN)?,
            schema: default_schema(),
        })
    }
}

fn require_env(name: &str) -> EsperarResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(EsperarError::invalid(format!(
            "environment variable {name} must be set and non-empty"
        ))),
    }
}
