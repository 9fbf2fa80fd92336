//! Unit tests for the session controller.

use super::*;
use crate::config::SessionConfig;
use async_trait::async_trait;
use drono_common::{EngineError, EngineResult, FetchMode, SessionEvent, SessionMode};
use drono_fetch::{FetchClient, FetchReport};
use drono_identity::{Connectivity, IdentityProfile, IdentityRotator, RotationConfig};
use drono_session_state::SessionStatus;
use drono_snapshot::{MemorySnapshotStore, SessionSnapshot, SnapshotStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Fake fetch client with a scriptable result and latency.
struct FakeFetchClient {
    calls: AtomicUsize,
    fail: AtomicBool,
    latency: Duration,
}

impl FakeFetchClient {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            latency: Duration::ZERO,
        }
    }

    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new()
        }
    }

    fn failing() -> Self {
        let client = Self::new();
        client.fail.store(true, Ordering::SeqCst);
        client
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchClient for FakeFetchClient {
    async fn fetch(&self, _target: &str, _profile: &IdentityProfile) -> EngineResult<FetchReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            Err(EngineError::fetch_failed("simulated fetch failure"))
        } else {
            Ok(FetchReport {
                status_code: 200,
                elapsed: Duration::from_millis(5),
            })
        }
    }
}

/// Connectivity that toggles instantly and always restores.
struct InstantConnectivity {
    toggles: AtomicUsize,
}

impl InstantConnectivity {
    fn new() -> Self {
        Self {
            toggles: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connectivity for InstantConnectivity {
    async fn disable(&self) -> EngineResult<()> {
        self.toggles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn enable(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        true
    }
}

struct TestRig {
    controller: SessionController,
    fetch: std::sync::Arc<FakeFetchClient>,
    connectivity: std::sync::Arc<InstantConnectivity>,
    snapshots: std::sync::Arc<MemorySnapshotStore>,
}

fn fast_rotation_config() -> RotationConfig {
    RotationConfig {
        settle_delay: Duration::from_millis(5),
        restore_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(2),
        max_attempts: 2,
        retry_delay: Duration::from_millis(5),
        backoff_rate: 1.5,
    }
}

fn create_rig(fetch: FakeFetchClient) -> TestRig {
    let fetch = std::sync::Arc::new(fetch);
    let connectivity = std::sync::Arc::new(InstantConnectivity::new());
    let snapshots = std::sync::Arc::new(MemorySnapshotStore::new());
    let rotator = std::sync::Arc::new(IdentityRotator::new(
        connectivity.clone(),
        fast_rotation_config(),
    ));
    let controller = SessionController::new(fetch.clone(), rotator, snapshots.clone());
    TestRig {
        controller,
        fetch,
        connectivity,
        snapshots,
    }
}

fn fast_config(total: u32) -> SessionConfig {
    SessionConfig {
        target_url: "https://example.com/page".to_string(),
        total_iterations: total,
        min_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
        rotation_delay: Duration::from_millis(5),
        rotate_identity: false,
        randomize_identity: false,
        fetch_mode: FetchMode::Http,
        mode: SessionMode::Continuous,
        max_consecutive_failures: None,
    }
}

/// Poll `controller.status()` until `predicate` returns true or the
/// timeout expires. Polls every 2ms. Panics with the final status on
/// timeout.
async fn wait_for_status(
    controller: &SessionController,
    predicate: impl Fn(SessionStatus) -> bool,
    timeout: Duration,
) {
    let poll_interval = Duration::from_millis(2);
    let result = tokio::time::timeout(timeout, async {
        loop {
            let status = controller.status().await;
            if predicate(status) {
                return status;
            }
            tokio::time::sleep(poll_interval).await;
        }
    })
    .await;

    if result.is_err() {
        let final_status = controller.status().await;
        panic!(
            "wait_for_status timed out after {:?}. Final status: {:?}",
            timeout, final_status
        );
    }
}

/// Drain all events currently buffered plus those arriving within a short
/// grace period.
async fn drain_events(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Some(event)) => events.push(event),
            _ => break,
        }
    }
    events
}

#[tokio::test]
async fn test_start_rejects_invalid_configuration() {
    let rig = create_rig(FakeFetchClient::new());

    let mut config = fast_config(5);
    config.total_iterations = 0;
    let err = rig.controller.start(config).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfiguration { .. }));

    let mut config = fast_config(5);
    config.min_delay = Duration::from_secs(10);
    config.max_delay = Duration::from_secs(1);
    let err = rig.controller.start(config).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfiguration { .. }));

    // Rejected synchronously: no state change, no fetches
    assert_eq!(rig.controller.status().await, SessionStatus::Idle);
    assert_eq!(rig.fetch.calls(), 0);
}

#[tokio::test]
async fn test_start_rejects_concurrent_session() {
    let rig = create_rig(FakeFetchClient::new());

    let mut config = fast_config(50);
    config.min_delay = Duration::from_millis(500);
    config.max_delay = Duration::from_millis(500);
    rig.controller.start(config.clone()).await.unwrap();

    let err = rig.controller.start(config).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_session_runs_to_completion_with_exact_progress() {
    let rig = create_rig(FakeFetchClient::new());
    let mut events = rig.controller.subscribe().await.unwrap();

    rig.controller.start(fast_config(5)).await.unwrap();
    wait_for_status(
        &rig.controller,
        |s| s == SessionStatus::Completed,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(rig.fetch.calls(), 5);

    let events = drain_events(&mut events).await;
    let progress: Vec<(u32, u32)> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Progress { current, total } => Some((*current, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![(0, 5), (1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]
    );

    // Rotation was disabled: no rotation events recorded
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::RotationStarted | SessionEvent::RotationEnded { .. })));

    // Final event is the completed status
    assert_eq!(
        events.last(),
        Some(&SessionEvent::StatusChanged {
            status: "completed".to_string()
        })
    );

    // Completion clears the snapshot
    assert!(rig.snapshots.load_session().await.unwrap().is_none());
}

#[tokio::test]
async fn test_stop_mid_delay_prevents_further_fetches() {
    let rig = create_rig(FakeFetchClient::new());

    let mut config = fast_config(10);
    config.min_delay = Duration::from_millis(500);
    config.max_delay = Duration::from_millis(500);
    rig.controller.start(config).await.unwrap();

    // Stop while the first delay is still pending
    tokio::time::sleep(Duration::from_millis(50)).await;
    rig.controller.stop().await.unwrap();
    assert_eq!(rig.controller.status().await, SessionStatus::Stopped);

    // No fetch ever started, progress stays at the last completed value
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(rig.fetch.calls(), 0);
    let info = rig.controller.info().await.unwrap().unwrap();
    assert_eq!(info.current_iteration, 0);

    // Stop is idempotent
    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_clears_snapshot_and_closes_events() {
    let rig = create_rig(FakeFetchClient::new());
    let mut events = rig.controller.subscribe().await.unwrap();

    let mut config = fast_config(10);
    config.min_delay = Duration::from_millis(300);
    config.max_delay = Duration::from_millis(300);
    rig.controller.start(config).await.unwrap();
    rig.controller.pause().await.unwrap();
    assert!(rig.snapshots.load_session().await.unwrap().is_some());

    rig.controller.stop().await.unwrap();
    assert!(rig.snapshots.load_session().await.unwrap().is_none());

    // The event channel closes after the terminal status event
    let events = drain_events(&mut events).await;
    assert_eq!(
        events.last(),
        Some(&SessionEvent::StatusChanged {
            status: "stopped".to_string()
        })
    );
    // Channel is closed: recv returns None immediately
    assert!(events.len() >= 2);
}

#[tokio::test]
async fn test_pause_resume_immediately_preserves_progress() {
    let rig = create_rig(FakeFetchClient::new());

    let mut config = fast_config(10);
    config.min_delay = Duration::from_millis(400);
    config.max_delay = Duration::from_millis(400);
    rig.controller.start(config).await.unwrap();

    let before = rig.controller.info().await.unwrap().unwrap();
    rig.controller.pause().await.unwrap();
    rig.controller.resume().await.unwrap();
    let after = rig.controller.info().await.unwrap().unwrap();

    assert_eq!(before.current_iteration, after.current_iteration);
    // No meaningful time elapsed between pause and resume
    assert!(after.accumulated_paused < Duration::from_millis(100));

    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_repeated_pause_resume_accumulates_monotonically() {
    let rig = create_rig(FakeFetchClient::new());

    let mut config = fast_config(10);
    config.min_delay = Duration::from_millis(400);
    config.max_delay = Duration::from_millis(400);
    rig.controller.start(config).await.unwrap();

    let mut previous = Duration::ZERO;
    for _ in 0..3 {
        rig.controller.pause().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        rig.controller.resume().await.unwrap();

        let info = rig.controller.info().await.unwrap().unwrap();
        assert!(info.accumulated_paused >= previous + Duration::from_millis(25));
        previous = info.accumulated_paused;
    }

    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_pause_and_resume_reject_invalid_states() {
    let rig = create_rig(FakeFetchClient::new());

    // No session at all
    let err = rig.controller.pause().await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    let err = rig.controller.resume().await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    let mut config = fast_config(10);
    config.min_delay = Duration::from_millis(300);
    config.max_delay = Duration::from_millis(300);
    rig.controller.start(config).await.unwrap();

    // Resume while running is rejected, state unchanged
    let err = rig.controller.resume().await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    assert_eq!(rig.controller.status().await, SessionStatus::Running);

    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_restore_from_running_snapshot_lands_in_paused() {
    let rig = create_rig(FakeFetchClient::new());

    // Snapshot recorded while running (no pause timestamp)
    let snapshot = SessionSnapshot {
        target_url: "https://example.com/page".to_string(),
        current_iteration: 3,
        total_iterations: 8,
        paused: false,
        start_time: chrono::Utc::now(),
        accumulated_paused_ms: 1200,
        pause_started_at: None,
    };
    rig.snapshots.save_session(&snapshot).await.unwrap();

    let restored = rig
        .controller
        .restore_from_snapshot(fast_config(1))
        .await
        .unwrap();
    assert!(restored);

    // Restoration is conservative: always paused, never running
    assert_eq!(rig.controller.status().await, SessionStatus::Paused);
    let info = rig.controller.info().await.unwrap().unwrap();
    assert_eq!(info.current_iteration, 3);
    assert_eq!(info.total_iterations, 8);
    assert_eq!(info.accumulated_paused, Duration::from_millis(1200));

    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_restore_without_snapshot_returns_false() {
    let rig = create_rig(FakeFetchClient::new());
    let restored = rig
        .controller
        .restore_from_snapshot(fast_config(1))
        .await
        .unwrap();
    assert!(!restored);
    assert_eq!(rig.controller.status().await, SessionStatus::Idle);
}

#[tokio::test]
async fn test_restored_session_resumes_and_completes() {
    let rig = create_rig(FakeFetchClient::new());

    let snapshot = SessionSnapshot {
        target_url: "https://example.com/page".to_string(),
        current_iteration: 3,
        total_iterations: 5,
        paused: true,
        start_time: chrono::Utc::now(),
        accumulated_paused_ms: 0,
        pause_started_at: Some(chrono::Utc::now()),
    };
    rig.snapshots.save_session(&snapshot).await.unwrap();

    assert!(rig
        .controller
        .restore_from_snapshot(fast_config(1))
        .await
        .unwrap());
    rig.controller.resume().await.unwrap();

    wait_for_status(
        &rig.controller,
        |s| s == SessionStatus::Completed,
        Duration::from_secs(5),
    )
    .await;

    // Only the remaining iterations ran
    assert_eq!(rig.fetch.calls(), 2);
}

#[tokio::test]
async fn test_trigger_iteration_bypasses_delay() {
    let rig = create_rig(FakeFetchClient::new());

    let mut config = fast_config(3);
    config.mode = SessionMode::ExternallyDriven;
    rig.controller.start(config).await.unwrap();

    // Externally driven sessions never self-fire
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rig.fetch.calls(), 0);

    rig.controller.trigger_iteration().await.unwrap();
    wait_for_status(
        &rig.controller,
        |s| s == SessionStatus::Running,
        Duration::from_secs(1),
    )
    .await;
    // Wait until the iteration lands
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while rig.fetch.calls() < 1 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(rig.fetch.calls(), 1);

    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_trigger_iteration_single_flight_guard() {
    let rig = create_rig(FakeFetchClient::with_latency(Duration::from_millis(300)));

    let mut config = fast_config(3);
    config.mode = SessionMode::ExternallyDriven;
    rig.controller.start(config).await.unwrap();

    rig.controller.trigger_iteration().await.unwrap();
    // Give the worker time to start its slow fetch
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = rig.controller.trigger_iteration().await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyInProgress { .. }));

    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_trigger_iteration_requires_running_session() {
    let rig = create_rig(FakeFetchClient::new());
    let err = rig.controller.trigger_iteration().await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_rotation_runs_from_second_iteration() {
    let rig = create_rig(FakeFetchClient::new());
    let mut events = rig.controller.subscribe().await.unwrap();

    let mut config = fast_config(3);
    config.rotate_identity = true;
    rig.controller.start(config).await.unwrap();

    wait_for_status(
        &rig.controller,
        |s| s == SessionStatus::Completed,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(rig.fetch.calls(), 3);
    // First iteration skips rotation; the remaining two rotate
    assert_eq!(rig.connectivity.toggles.load(Ordering::SeqCst), 2);

    let events = drain_events(&mut events).await;
    let started = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::RotationStarted))
        .count();
    let ended = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::RotationEnded { success: true }))
        .count();
    assert_eq!(started, 2);
    assert_eq!(ended, 2);
}

#[tokio::test]
async fn test_failed_fetch_still_consumes_iteration() {
    let rig = create_rig(FakeFetchClient::failing());

    rig.controller.start(fast_config(3)).await.unwrap();
    wait_for_status(
        &rig.controller,
        |s| s == SessionStatus::Completed,
        Duration::from_secs(5),
    )
    .await;

    // Every failed iteration counted; no infinite retry of a single index
    assert_eq!(rig.fetch.calls(), 3);
    let info = rig.controller.info().await.unwrap().unwrap();
    assert_eq!(info.current_iteration, 3);
}

#[tokio::test]
async fn test_strict_mode_aborts_after_consecutive_failures() {
    let rig = create_rig(FakeFetchClient::failing());

    let mut config = fast_config(10);
    config.max_consecutive_failures = Some(2);
    rig.controller.start(config).await.unwrap();

    wait_for_status(
        &rig.controller,
        |s| s == SessionStatus::Error,
        Duration::from_secs(5),
    )
    .await;

    // Exactly the threshold ran before the abort
    assert_eq!(rig.fetch.calls(), 2);

    // Error recovers only via stop; a new start works afterwards
    let err = rig.controller.pause().await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    rig.controller.stop().await.unwrap();
    rig.controller.start(fast_config(1)).await.unwrap();
    rig.controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_subscribe_replaces_previous_listener() {
    let rig = create_rig(FakeFetchClient::new());

    let mut first = rig.controller.subscribe().await.unwrap();
    let mut second = rig.controller.subscribe().await.unwrap();

    // The first channel closed when it was replaced
    assert!(first.recv().await.is_none());

    rig.controller.start(fast_config(1)).await.unwrap();
    wait_for_status(
        &rig.controller,
        |s| s == SessionStatus::Completed,
        Duration::from_secs(5),
    )
    .await;

    let events = drain_events(&mut second).await;
    assert!(!events.is_empty());
}
