//! # Drono Fetch
//!
//! The fetch capability consumed once per iteration by the session
//! controller, and a direct-HTTP implementation of it.
//!
//! Hosts running in embedded-browser mode inject their own `FetchClient`;
//! the engine only cares about the success/failure/timing report.
//! Request timeouts are this capability's responsibility, not the
//! controller's.

use async_trait::async_trait;
use drono_common::{EngineError, EngineResult};
use drono_identity::IdentityProfile;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub status_code: u16,
    pub elapsed: Duration,
}

/// Capability that executes one request against the target.
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Execute a single request with the given fingerprint. Implementations
    /// must enforce their own timeout and return `FetchFailed` rather than
    /// hanging.
    async fn fetch(&self, target: &str, profile: &IdentityProfile) -> EngineResult<FetchReport>;
}

/// Default request timeout for the direct-HTTP client.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Direct-HTTP fetch client.
///
/// Sends one GET per iteration with the profile's user agent. A non-2xx/3xx
/// status is reported as a failed fetch so the controller can count it
/// against the consecutive-failure threshold when strict mode is enabled.
pub struct HttpFetchClient {
    client: reqwest::Client,
}

impl HttpFetchClient {
    pub fn new(timeout: Duration) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::fetch_failed(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_defaults() -> EngineResult<Self> {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn fetch(&self, target: &str, profile: &IdentityProfile) -> EngineResult<FetchReport> {
        debug!("Fetching {} as {}", target, profile.user_agent);
        let started = tokio::time::Instant::now();

        let response = self
            .client
            .get(target)
            .header(reqwest::header::USER_AGENT, &profile.user_agent)
            .send()
            .await
            .map_err(|e| EngineError::fetch_failed(format!("request to {} failed: {}", target, e)))?;

        let elapsed = started.elapsed();
        let status = response.status();

        if status.is_success() || status.is_redirection() {
            info!(
                "Fetch succeeded: {} in {}ms",
                status.as_u16(),
                elapsed.as_millis()
            );
            Ok(FetchReport {
                status_code: status.as_u16(),
                elapsed,
            })
        } else {
            Err(EngineError::fetch_failed(format!(
                "{} returned status {}",
                target,
                status.as_u16()
            )))
        }
    }
}
