use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::VerifactuError;
use crate::retry::RetryPolicy;
use crate::soap::{Endpoint, SoftwareInfo};

/// Default hard deadline of one HTTP attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the client needs except TLS material.
///
/// ```
/// use std::time::Duration;
/// use verifactu::client::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{
///     "endpoint": "production",
///     "request_timeout": { "secs": 20, "nanos": 0 }
/// }"#).unwrap();
/// assert_eq!(config.request_timeout, Duration::from_secs(20));
/// assert_eq!(config.retry.service_unavailable.max_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub software: SoftwareInfo,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            software: SoftwareInfo::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON configuration file; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, VerifactuError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VerifactuError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| VerifactuError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.check()?;
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cap the summed backoff of one submission.
    pub fn with_backoff_budget(mut self, budget: Duration) -> Self {
        self.retry.max_total_backoff = Some(budget);
        self
    }

    pub fn with_software(mut self, software: SoftwareInfo) -> Self {
        self.software = software;
        self
    }

    pub fn check(&self) -> Result<(), VerifactuError> {
        if self.request_timeout.is_zero() {
            return Err(VerifactuError::Config("request_timeout must be positive".into()));
        }
        let url = self.endpoint.url();
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(VerifactuError::Config(format!("endpoint '{url}' is not an HTTP URL")));
        }
        Ok(())
    }
}
