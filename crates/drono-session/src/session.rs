//! Session data model.

use crate::config::SessionConfig;
use chrono::{DateTime, Utc};
use drono_common::{FetchMode, SessionMode};
use drono_identity::IdentityProfile;
use drono_session_state::{SessionStateMachine, SessionStatus};
use drono_snapshot::SessionSnapshot;
use std::collections::HashSet;
use std::time::Duration;

/// One run of N iterations against a target.
///
/// Owned exclusively by the session actor; external callers observe it
/// through [`SessionInfo`] projections and mutate it only via the
/// controller's transition methods.
#[derive(Debug)]
pub struct Session {
    pub config: SessionConfig,
    pub machine: SessionStateMachine,
    pub current_iteration: u32,
    pub started_at: DateTime<Utc>,
    /// Total wall-clock time spent paused; only grows while paused.
    pub accumulated_paused: Duration,
    /// Set while paused, cleared on resume.
    pub pause_started_at: Option<DateTime<Utc>>,
    /// Fingerprint reused for every iteration when randomization is off.
    pub fixed_profile: IdentityProfile,
    /// Externally visible addresses already used by this session. An
    /// address seen before forces a rotation even on the first iteration.
    pub used_addresses: HashSet<String>,
    /// Force a rotation before the next iteration regardless of position
    /// (set after resume and restore).
    pub force_rotation: bool,
    /// Consecutive failed iterations, for the strict-mode threshold.
    pub consecutive_failures: u32,
}

impl Session {
    /// Create a fresh session; the controller drives the state machine
    /// from `Idle` to `Running` once the configuration is accepted.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            machine: SessionStateMachine::new(),
            current_iteration: 0,
            started_at: Utc::now(),
            accumulated_paused: Duration::ZERO,
            pause_started_at: None,
            fixed_profile: IdentityProfile::fixed(),
            used_addresses: HashSet::new(),
            force_rotation: false,
            consecutive_failures: 0,
        }
    }

    /// Reconstruct a session from a snapshot. Restoration is conservative:
    /// the session always comes back `Paused`, even when the snapshot was
    /// recorded while running, so the operator must explicitly resume.
    /// The caller-provided config supplies delay bounds and flags; the
    /// snapshot supplies the target and all progress bookkeeping.
    pub fn from_snapshot(snapshot: &SessionSnapshot, mut config: SessionConfig) -> Self {
        config.target_url = snapshot.target_url.clone();
        config.total_iterations = snapshot.total_iterations;

        Self {
            config,
            machine: SessionStateMachine::from_restored(SessionStatus::Paused),
            current_iteration: snapshot.current_iteration,
            started_at: snapshot.start_time,
            accumulated_paused: Duration::from_millis(snapshot.accumulated_paused_ms),
            // A snapshot recorded while running has no pause start; the
            // restore itself becomes the start of the pause.
            pause_started_at: Some(snapshot.pause_started_at.unwrap_or_else(Utc::now)),
            fixed_profile: IdentityProfile::fixed(),
            used_addresses: HashSet::new(),
            force_rotation: true,
            consecutive_failures: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.machine.current_status()
    }

    /// Select the fingerprint for the next iteration.
    pub fn next_profile(&self) -> IdentityProfile {
        if self.config.randomize_identity {
            IdentityProfile::randomized()
        } else {
            self.fixed_profile.clone()
        }
    }

    /// Whether the next iteration should rotate the identity first.
    /// The first iteration skips rotation unless a previously used address
    /// is being reused or a resume/restore forced it.
    pub fn should_rotate_next(&self) -> bool {
        if !self.config.rotate_identity {
            return false;
        }
        self.force_rotation || self.current_iteration > 0 || !self.used_addresses.is_empty()
    }

    /// Project the durable snapshot of this session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            target_url: self.config.target_url.clone(),
            current_iteration: self.current_iteration,
            total_iterations: self.config.total_iterations,
            paused: self.status() == SessionStatus::Paused,
            start_time: self.started_at,
            accumulated_paused_ms: self.accumulated_paused.as_millis() as u64,
            pause_started_at: self.pause_started_at,
        }
    }

    /// Project the public view of this session.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            target_url: self.config.target_url.clone(),
            current_iteration: self.current_iteration,
            total_iterations: self.config.total_iterations,
            status: self.status(),
            started_at: self.started_at,
            accumulated_paused: self.accumulated_paused,
            fetch_mode: self.config.fetch_mode,
            mode: self.config.mode,
            rotate_identity: self.config.rotate_identity,
            randomize_identity: self.config.randomize_identity,
        }
    }
}

/// Session information structure for external queries.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub target_url: String,
    pub current_iteration: u32,
    pub total_iterations: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub accumulated_paused: Duration,
    pub fetch_mode: FetchMode,
    pub mode: SessionMode,
    pub rotate_identity: bool,
    pub randomize_identity: bool,
}
