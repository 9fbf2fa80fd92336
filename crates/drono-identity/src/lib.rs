//! # Drono Identity
//!
//! Network-identity rotation and simulated client fingerprints.
//!
//! This crate provides:
//! - The `Connectivity` capability trait (plus a shell-command
//!   implementation for adb/`svc`-style toggling)
//! - The `IdentityRotator`, which performs the disable/settle/enable/
//!   verify cycle between iterations with bounded retries
//! - `IdentityProfile` pools for per-iteration fingerprint randomization

pub mod connectivity;
pub mod profile;
pub mod rotator;

pub use connectivity::{AlwaysOnline, Connectivity, ShellConnectivity, ShellConnectivityConfig};
pub use profile::{ClientType, DeviceTier, IdentityProfile, Platform};
pub use rotator::{IdentityRotator, RotationConfig, RotationOutcome, RotationPhase};
