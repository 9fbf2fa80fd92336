//! Engine configuration file (YAML).

use anyhow::{Context, Result};
use drono_common::{FetchMode, SessionMode};
use drono_distribution::DistributionPattern;
use drono_identity::ShellConnectivityConfig;
use drono_session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub session: SessionSettings,
    /// Shell commands for connectivity toggling. Required when identity
    /// rotation is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectivity: Option<ConnectivitySettings>,
    /// Present when running in scheduled mode; absent for continuous mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionSettings>,
    /// Base directory override for snapshot files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub target_url: String,
    pub iterations: u32,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_rotation_delay_ms")]
    pub rotation_delay_ms: u64,
    #[serde(default = "default_true")]
    pub rotate_identity: bool,
    #[serde(default = "default_true")]
    pub randomize_identity: bool,
    #[serde(default)]
    pub fetch_mode: FetchMode,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Strict mode: abort after this many consecutive failed iterations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    pub disable_command: String,
    pub enable_command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSettings {
    pub window_hours: u32,
    pub pattern: DistributionPattern,
}

fn default_min_delay_ms() -> u64 {
    30_000
}

fn default_max_delay_ms() -> u64 {
    120_000
}

fn default_rotation_delay_ms() -> u64 {
    3_000
}

fn default_fetch_timeout_ms() -> u64 {
    120_000
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read config file {}", path.as_ref().display())
        })?;
        let config: EngineConfig = serde_yaml::from_str(&content).with_context(|| {
            format!("Failed to parse config file {}", path.as_ref().display())
        })?;
        Ok(config)
    }

    /// Whether the scheduled (distribution) mode is requested.
    pub fn scheduled_mode(&self) -> bool {
        self.distribution.is_some()
    }

    /// Build the session configuration for the selected mode.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            target_url: self.session.target_url.clone(),
            total_iterations: self.session.iterations,
            min_delay: Duration::from_millis(self.session.min_delay_ms),
            max_delay: Duration::from_millis(self.session.max_delay_ms),
            rotation_delay: Duration::from_millis(self.session.rotation_delay_ms),
            rotate_identity: self.session.rotate_identity,
            randomize_identity: self.session.randomize_identity,
            fetch_mode: self.session.fetch_mode,
            mode: if self.scheduled_mode() {
                SessionMode::ExternallyDriven
            } else {
                SessionMode::Continuous
            },
            max_consecutive_failures: self.session.max_consecutive_failures,
        }
    }
}

impl From<&ConnectivitySettings> for ShellConnectivityConfig {
    fn from(settings: &ConnectivitySettings) -> Self {
        ShellConnectivityConfig {
            disable_command: settings.disable_command.clone(),
            enable_command: settings.enable_command.clone(),
            probe_command: settings.probe_command.clone(),
            address_command: settings.address_command.clone(),
        }
    }
}
