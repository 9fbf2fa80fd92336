use chrono::{DateTime, Utc};
use drono_common::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session is active
    Idle,
    /// Iterations are being executed
    Running,
    /// Suspended by the operator; can be resumed
    Paused,
    /// Explicitly stopped; terminal
    Stopped,
    /// All iterations finished; terminal
    Completed,
    /// Strict-mode failure threshold exceeded; recoverable only via stop
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Stopped => write!(f, "stopped"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

impl SessionStatus {
    /// Check if the session is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Completed)
    }

    /// Check if the session holds resources (a started, not-yet-finished run)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionStatus::Running | SessionStatus::Paused | SessionStatus::Error
        )
    }
}

/// State machine that manages transitions between session statuses
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    current_status: SessionStatus,
    previous_status: Option<SessionStatus>,
    status_history: Vec<StatusTransition>,
    last_transition_time: DateTime<Utc>,
}

/// Represents a status transition with timestamp and optional reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from_status: SessionStatus,
    pub to_status: SessionStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    /// Create a new state machine in the idle status
    pub fn new() -> Self {
        Self {
            current_status: SessionStatus::Idle,
            previous_status: None,
            status_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    /// Create a state machine from a restored status (snapshot recovery)
    pub fn from_restored(status: SessionStatus) -> Self {
        Self {
            current_status: status,
            previous_status: None,
            status_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    /// Get the current status
    pub fn current_status(&self) -> SessionStatus {
        self.current_status
    }

    /// Get the previous status
    pub fn previous_status(&self) -> Option<SessionStatus> {
        self.previous_status
    }

    /// Get the status history
    pub fn status_history(&self) -> &[StatusTransition] {
        &self.status_history
    }

    /// Get the time of the last transition
    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// Check if a transition from the current status to the target is valid
    pub fn is_valid_transition(&self, target: SessionStatus) -> bool {
        match (self.current_status, target) {
            // From Idle
            (SessionStatus::Idle, SessionStatus::Running) => true,
            (SessionStatus::Idle, SessionStatus::Paused) => true, // snapshot restore
            (SessionStatus::Idle, SessionStatus::Stopped) => true,

            // From Running
            (SessionStatus::Running, SessionStatus::Paused) => true,
            (SessionStatus::Running, SessionStatus::Stopped) => true,
            (SessionStatus::Running, SessionStatus::Completed) => true,
            (SessionStatus::Running, SessionStatus::Error) => true,

            // From Paused
            (SessionStatus::Paused, SessionStatus::Running) => true,
            (SessionStatus::Paused, SessionStatus::Stopped) => true,

            // From Error: only an explicit stop recovers
            (SessionStatus::Error, SessionStatus::Stopped) => true,

            // Same status (no-op)
            (status, target) if status == target => true,

            // All other transitions are invalid
            _ => false,
        }
    }

    /// Transition to a new status with optional reason
    pub fn transition_to(
        &mut self,
        target: SessionStatus,
        reason: Option<String>,
    ) -> EngineResult<()> {
        if !self.is_valid_transition(target) {
            return Err(EngineError::invalid_transition(
                format!("{}", target),
                format!("{}", self.current_status),
            ));
        }

        let now = Utc::now();
        let transition = StatusTransition {
            from_status: self.current_status,
            to_status: target,
            timestamp: now,
            reason,
        };

        self.previous_status = Some(self.current_status);
        self.current_status = target;
        self.last_transition_time = now;
        self.status_history.push(transition);

        // Limit history size to prevent unbounded growth
        if self.status_history.len() > 100 {
            self.status_history.remove(0);
        }

        tracing::debug!(
            "Session transitioned from {} to {}",
            self.previous_status.unwrap(),
            self.current_status
        );

        Ok(())
    }

    /// Convenience methods for specific transitions
    pub fn transition_to_running(&mut self) -> EngineResult<()> {
        self.transition_to(SessionStatus::Running, Some("session started".to_string()))
    }

    pub fn transition_to_paused(&mut self) -> EngineResult<()> {
        self.transition_to(SessionStatus::Paused, Some("session paused".to_string()))
    }

    pub fn transition_to_stopped(&mut self) -> EngineResult<()> {
        self.transition_to(SessionStatus::Stopped, Some("session stopped".to_string()))
    }

    pub fn transition_to_completed(&mut self) -> EngineResult<()> {
        self.transition_to(
            SessionStatus::Completed,
            Some("all iterations finished".to_string()),
        )
    }

    pub fn transition_to_error(&mut self, reason: String) -> EngineResult<()> {
        self.transition_to(SessionStatus::Error, Some(reason))
    }

    /// Check if the session can be paused
    pub fn can_pause(&self) -> bool {
        matches!(self.current_status, SessionStatus::Running)
    }

    /// Check if the session can be resumed
    pub fn can_resume(&self) -> bool {
        matches!(self.current_status, SessionStatus::Paused)
    }

    /// Check if the session can be stopped
    pub fn can_stop(&self) -> bool {
        !self.current_status.is_terminal()
    }

    /// Get the time spent in the current status
    pub fn time_in_current_status(&self) -> chrono::Duration {
        Utc::now() - self.last_transition_time
    }

    /// Get the most recent transition
    pub fn last_transition(&self) -> Option<&StatusTransition> {
        self.status_history.last()
    }

    /// Reset the state machine to idle
    pub fn reset(&mut self) {
        self.current_status = SessionStatus::Idle;
        self.previous_status = None;
        self.status_history.clear();
        self.last_transition_time = Utc::now();
    }
}
