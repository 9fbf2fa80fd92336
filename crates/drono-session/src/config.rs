//! Session configuration and validation.

use drono_common::{EngineError, EngineResult, FetchMode, SessionMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one simulation session.
///
/// Validated synchronously by `start()` before any state change; an
/// invalid configuration never creates a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Target endpoint fetched once per iteration.
    pub target_url: String,
    /// Total number of iterations to run.
    pub total_iterations: u32,
    /// Minimum delay before each iteration.
    #[serde(with = "duration_millis")]
    pub min_delay: Duration,
    /// Maximum delay before each iteration.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// How long connectivity stays disabled during an identity rotation.
    #[serde(with = "duration_millis")]
    pub rotation_delay: Duration,
    /// Whether to rotate the network identity between iterations.
    pub rotate_identity: bool,
    /// Whether to draw a fresh fingerprint per iteration.
    pub randomize_identity: bool,
    /// How requests are executed (direct HTTP vs. embedded browser).
    pub fetch_mode: FetchMode,
    /// Who drives the iteration cadence.
    pub mode: SessionMode,
    /// Strict-mode extension point: abort the session with an `Error`
    /// status after this many consecutive failed iterations. `None`
    /// (the default) keeps every failure non-fatal.
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
}

impl SessionConfig {
    /// A configuration with the given target and iteration count and
    /// conventional defaults for everything else.
    pub fn new(target_url: impl Into<String>, total_iterations: u32) -> Self {
        Self {
            target_url: target_url.into(),
            total_iterations,
            min_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(120),
            rotation_delay: Duration::from_secs(3),
            rotate_identity: true,
            randomize_identity: true,
            fetch_mode: FetchMode::Http,
            mode: SessionMode::Continuous,
            max_consecutive_failures: None,
        }
    }

    /// Validate the configuration. Called by the controller before any
    /// state changes; errors here are always `InvalidConfiguration`.
    pub fn validate(&self) -> EngineResult<()> {
        if self.target_url.trim().is_empty() {
            return Err(EngineError::invalid_configuration(
                "target URL must not be empty",
            ));
        }
        if self.total_iterations == 0 {
            return Err(EngineError::invalid_configuration(
                "total iterations must be greater than zero",
            ));
        }
        if self.min_delay.is_zero() || self.max_delay.is_zero() {
            return Err(EngineError::invalid_configuration(
                "iteration delays must be greater than zero",
            ));
        }
        if self.min_delay > self.max_delay {
            return Err(EngineError::invalid_configuration(format!(
                "minimum delay {}ms exceeds maximum delay {}ms",
                self.min_delay.as_millis(),
                self.max_delay.as_millis()
            )));
        }
        if self.rotate_identity && self.rotation_delay.is_zero() {
            return Err(EngineError::invalid_configuration(
                "rotation delay must be greater than zero when rotation is enabled",
            ));
        }
        Ok(())
    }
}

/// Serialize `std::time::Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
