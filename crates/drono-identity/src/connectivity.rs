//! Connectivity capability.
//!
//! The identity rotator obtains a fresh externally visible address by
//! disabling and re-enabling network connectivity through this trait.
//! Hosts inject the implementation that matches their environment; the
//! bundled [`ShellConnectivity`] runs configured command lines (e.g. adb
//! `svc` toggles for a tethered device, or `nmcli` on a Linux host).

use async_trait::async_trait;
use drono_common::{EngineError, EngineResult};
use tracing::debug;

/// Network connectivity control consumed by the identity rotator.
#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Disable network connectivity.
    async fn disable(&self) -> EngineResult<()>;

    /// Re-enable network connectivity.
    async fn enable(&self) -> EngineResult<()>;

    /// Whether connectivity is currently available.
    async fn is_connected(&self) -> bool;

    /// The externally visible network address, when the implementation can
    /// determine it. Used only for best-effort rotation verification.
    async fn external_address(&self) -> EngineResult<Option<String>> {
        Ok(None)
    }
}

/// Connectivity stand-in for hosts that never rotate (rotation disabled
/// or no toggling mechanism available). Toggles are no-ops and the
/// connection always reports as restored.
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn disable(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn enable(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        true
    }
}

/// Configuration for [`ShellConnectivity`].
#[derive(Debug, Clone)]
pub struct ShellConnectivityConfig {
    /// Command line that disables connectivity.
    pub disable_command: String,
    /// Command line that re-enables connectivity.
    pub enable_command: String,
    /// Command line whose success indicates connectivity is restored.
    /// When absent, connectivity is assumed restored after `enable`.
    pub probe_command: Option<String>,
    /// Command line printing the externally visible address on stdout.
    pub address_command: Option<String>,
}

/// Connectivity implementation that shells out to configured commands.
pub struct ShellConnectivity {
    config: ShellConnectivityConfig,
}

impl ShellConnectivity {
    pub fn new(config: ShellConnectivityConfig) -> Self {
        Self { config }
    }

    async fn run(command: &str) -> EngineResult<std::process::Output> {
        debug!("Running connectivity command: {}", command);
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| {
                EngineError::rotation_failed(format!("command '{}' failed to spawn: {}", command, e))
            })
    }

    async fn run_checked(command: &str) -> EngineResult<String> {
        let output = Self::run(command).await?;
        if !output.status.success() {
            return Err(EngineError::rotation_failed(format!(
                "command '{}' exited with {}",
                command, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Connectivity for ShellConnectivity {
    async fn disable(&self) -> EngineResult<()> {
        Self::run_checked(&self.config.disable_command).await?;
        Ok(())
    }

    async fn enable(&self) -> EngineResult<()> {
        Self::run_checked(&self.config.enable_command).await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        match &self.config.probe_command {
            Some(probe) => matches!(Self::run(probe).await, Ok(output) if output.status.success()),
            None => true,
        }
    }

    async fn external_address(&self) -> EngineResult<Option<String>> {
        match &self.config.address_command {
            Some(command) => {
                let address = Self::run_checked(command).await?;
                Ok((!address.is_empty()).then_some(address))
            }
            None => Ok(None),
        }
    }
}
