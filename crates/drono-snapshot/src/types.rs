//! Snapshot data structures (persisted as JSON).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimal durable projection of a session, written whenever the host
/// process may be interrupted and read back to reconstruct the session on
/// resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub target_url: String,
    pub current_iteration: u32,
    pub total_iterations: u32,
    /// Whether the session was paused when the snapshot was taken.
    pub paused: bool,
    pub start_time: DateTime<Utc>,
    /// Total wall-clock time spent paused, in milliseconds.
    pub accumulated_paused_ms: u64,
    /// Set iff `paused` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_started_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// A snapshot must be internally consistent: a paused snapshot always
    /// carries the pause start time, and progress never exceeds the total.
    pub fn is_consistent(&self) -> bool {
        if self.paused && self.pause_started_at.is_none() {
            return false;
        }
        if self.total_iterations == 0 {
            return false;
        }
        self.current_iteration <= self.total_iterations
    }
}

/// Durable projection of a distribution schedule's progress.
///
/// The pattern is stored flat (name plus optional peak parameters) so the
/// schedule can be recomputed on restore without this crate depending on
/// the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    pub current_index: u32,
    pub total_entries: u32,
    pub start_time: DateTime<Utc>,
    pub paused: bool,
    pub window_hours: u32,
    pub pattern_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_start_hour: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_end_hour: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_weight: Option<f64>,
}

impl DistributionSnapshot {
    pub fn is_consistent(&self) -> bool {
        if self.total_entries == 0 || self.window_hours == 0 {
            return false;
        }
        self.current_index <= self.total_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> SessionSnapshot {
        SessionSnapshot {
            target_url: "https://example.com/page".to_string(),
            current_iteration: 3,
            total_iterations: 10,
            paused: true,
            start_time: Utc::now(),
            accumulated_paused_ms: 1500,
            pause_started_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_consistent_snapshot() {
        assert!(sample_session().is_consistent());
    }

    #[test]
    fn test_paused_without_pause_time_is_inconsistent() {
        let mut snapshot = sample_session();
        snapshot.pause_started_at = None;
        assert!(!snapshot.is_consistent());
    }

    #[test]
    fn test_progress_beyond_total_is_inconsistent() {
        let mut snapshot = sample_session();
        snapshot.current_iteration = 11;
        assert!(!snapshot.is_consistent());
    }

    #[test]
    fn test_session_snapshot_round_trip() {
        let snapshot = sample_session();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, restored);
    }
}
