//! Core domain types shared across the drono engine crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a single request is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Direct HTTP request.
    Http,
    /// Embedded-browser emulation (provided by the host's fetch client).
    Browser,
}

impl Default for FetchMode {
    fn default() -> Self {
        FetchMode::Http
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMode::Http => write!(f, "http"),
            FetchMode::Browser => write!(f, "browser"),
        }
    }
}

/// Who drives the iteration cadence of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// The session controller arms its own inter-iteration delays and runs
    /// iterations back to back until completion.
    Continuous,
    /// Iterations fire only when an external caller (the distribution
    /// scheduler) triggers them; the controller's own delay step is bypassed.
    ExternallyDriven,
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::Continuous
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Continuous => write!(f, "continuous"),
            SessionMode::ExternallyDriven => write!(f, "externally_driven"),
        }
    }
}

/// Events delivered on a session's progress channel.
///
/// A subscriber receives these in order; the channel closes when the
/// session is stopped so listeners never dangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An iteration completed; `current` iterations out of `total` are done.
    Progress { current: u32, total: u32 },
    /// An identity rotation attempt started.
    RotationStarted,
    /// An identity rotation attempt ended.
    RotationEnded { success: bool },
    /// The session status changed (stringly-typed to keep this crate free
    /// of the state-machine dependency).
    StatusChanged { status: String },
}

/// Events emitted by the identity rotator for UI correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationEvent {
    OperationStarted,
    OperationEnded { success: bool },
}
