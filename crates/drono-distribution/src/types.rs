//! Public types for the distribution scheduler.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Distribution scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionState {
    /// No schedule has been computed yet
    Unconfigured,
    /// A schedule exists but the timer is not armed
    Configured,
    /// Entries are being fired at their scheduled times
    Running,
    /// Firing suspended; unfired entries will shift on resume
    Paused,
    /// Every entry has fired
    Completed,
    /// Stopped; remaining entries were discarded
    Stopped,
}

impl fmt::Display for DistributionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionState::Unconfigured => write!(f, "unconfigured"),
            DistributionState::Configured => write!(f, "configured"),
            DistributionState::Running => write!(f, "running"),
            DistributionState::Paused => write!(f, "paused"),
            DistributionState::Completed => write!(f, "completed"),
            DistributionState::Stopped => write!(f, "stopped"),
        }
    }
}

impl DistributionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DistributionState::Completed | DistributionState::Stopped
        )
    }
}

/// Events delivered on the scheduler's event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionEvent {
    /// Running/paused flips and overall progress (0-100).
    StatusChanged { running: bool, progress: u8 },
    /// The next entry has been armed.
    EntryScheduled {
        fire_in: Duration,
        index: u32,
        total: u32,
    },
}

/// Progress and time estimation snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionProgress {
    pub fired: u32,
    pub total: u32,
    /// 0-100.
    pub percent: u8,
    /// Unfired entry count times the average observed inter-entry gap.
    pub estimated_remaining: Duration,
    pub estimated_completion: DateTime<Utc>,
}
