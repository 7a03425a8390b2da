//! # HTTP Health Probe
//!
//! A best-effort pre-flight run before each socket attempt. It hits the feed
//! server's plain HTTP health endpoint through a `reqwest_middleware` client
//! with a single transient retry. Whatever happens, the socket attempt goes
//! ahead: the probe only leaves a log line behind.

use std::time::Duration;

use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::core::errors::FeedError;

#[derive(Clone)]
pub struct HealthProbe {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    url: Url,
    timeout: Duration,
}

impl HealthProbe {
    /// Creates a probe for `url` bounded by `timeout` overall.
    pub fn new(url: Url, timeout: Duration) -> Self {
        // One retry: the probe must not hold up the socket for long.
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(1);

        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self { inner: client, url, timeout }
    }

    /// Performs the GET and returns the HTTP status.
    ///
    /// # Errors
    /// `FeedError::Transport` on timeout, network failure or a non-2xx status.
    pub async fn check(&self) -> Result<u16, FeedError> {
        let request = self.inner.get(self.url.clone()).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FeedError::Transport(format!("health check timed out after {}ms", self.timeout.as_millis())))?
            .map_err(|e| FeedError::Transport(format!("health check failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(FeedError::Transport(format!("health check returned {}", status)))
        }
    }

    /// Runs [`check`](Self::check) and only logs the outcome.
    pub async fn check_best_effort(&self) {
        match self.check().await {
            Ok(status) => log::debug!("Health check {} -> {}", self.url, status),
            Err(e) => log::warn!("{} ({}); opening socket anyway", e, self.url),
        }
    }
}

impl std::fmt::Debug for HealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProbe")
            .field("url", &self.url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}
