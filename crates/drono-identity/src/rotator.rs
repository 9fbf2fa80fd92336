//! Identity rotation controller.
//!
//! A rotation toggles connectivity off and on so the next request
//! originates from a fresh externally visible address, then polls for
//! restoration within a bounded timeout. At most one rotation may be
//! outstanding at a time; callers racing `rotate()` get
//! `AlreadyInProgress` instead of a second toggle.

use crate::connectivity::Connectivity;
use drono_common::{EngineError, EngineResult, RotationEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Phase of the current (or most recent) rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    Idle,
    Toggling,
    Verifying,
    Done,
    Failed,
}

/// Rotation behavior configuration.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// How long to stay disconnected before re-enabling (the
    /// identity-rotation delay).
    pub settle_delay: Duration,
    /// Bounded wait for connectivity restoration after re-enabling.
    pub restore_timeout: Duration,
    /// Poll cadence while waiting for restoration.
    pub poll_interval: Duration,
    /// Total toggle attempts before the rotation is reported failed.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub retry_delay: Duration,
    /// Multiplier applied to the retry delay after each failed attempt.
    pub backoff_rate: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(3),
            restore_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            backoff_rate: 1.5,
        }
    }
}

/// Result of a successful rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub previous_address: Option<String>,
    pub new_address: Option<String>,
    /// `None` when the connectivity capability cannot report addresses;
    /// verification is best-effort and an unchanged address does not fail
    /// the rotation.
    pub address_changed: Option<bool>,
    pub attempts: u32,
}

/// Controller performing network-identity resets between iterations.
pub struct IdentityRotator {
    connectivity: Arc<dyn Connectivity>,
    config: RotationConfig,
    in_flight: AtomicBool,
    phase: Mutex<RotationPhase>,
    events: Mutex<Option<mpsc::UnboundedSender<RotationEvent>>>,
}

impl IdentityRotator {
    pub fn new(connectivity: Arc<dyn Connectivity>, config: RotationConfig) -> Self {
        Self {
            connectivity,
            config,
            in_flight: AtomicBool::new(false),
            phase: Mutex::new(RotationPhase::Idle),
            events: Mutex::new(None),
        }
    }

    /// Register the sink for rotation start/end events, replacing any
    /// previous one.
    pub fn set_event_sender(&self, sender: Option<mpsc::UnboundedSender<RotationEvent>>) {
        *self.events.lock().unwrap() = sender;
    }

    /// Phase of the current or most recent rotation.
    pub fn phase(&self) -> RotationPhase {
        *self.phase.lock().unwrap()
    }

    /// Force-clear a stuck in-flight rotation (used after an abnormal
    /// stop). Also the way to leave `Failed` without starting a new
    /// rotation.
    pub fn reset_state(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
        self.set_phase(RotationPhase::Idle);
        debug!("Rotation state reset");
    }

    /// Perform one identity rotation: disable connectivity, wait the
    /// settle delay, re-enable, and poll for restoration within the
    /// bounded timeout. Retries with backoff up to the configured attempt
    /// limit before reporting failure.
    pub async fn rotate(&self) -> EngineResult<RotationOutcome> {
        self.rotate_with_settle(self.config.settle_delay).await
    }

    /// Like [`rotate`](Self::rotate) but with a caller-supplied settle
    /// delay. Sessions carry their own rotation delay while the rotator
    /// (and its connectivity handle) is shared.
    pub async fn rotate_with_settle(&self, settle_delay: Duration) -> EngineResult<RotationOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::already_in_progress("rotate"));
        }

        self.emit(RotationEvent::OperationStarted);
        let result = self.run_attempts(settle_delay).await;

        match &result {
            Ok(outcome) => {
                self.set_phase(RotationPhase::Done);
                info!(
                    "Identity rotation succeeded after {} attempt(s): {:?} -> {:?}",
                    outcome.attempts, outcome.previous_address, outcome.new_address
                );
            }
            Err(e) => {
                self.set_phase(RotationPhase::Failed);
                warn!("Identity rotation failed: {}", e);
            }
        }

        self.in_flight.store(false, Ordering::SeqCst);
        self.emit(RotationEvent::OperationEnded {
            success: result.is_ok(),
        });
        result
    }

    async fn run_attempts(&self, settle_delay: Duration) -> EngineResult<RotationOutcome> {
        let mut retry_delay = self.config.retry_delay;
        let mut last_error =
            EngineError::rotation_failed("no rotation attempts were made".to_string());

        for attempt in 1..=self.config.max_attempts.max(1) {
            if attempt > 1 {
                debug!(
                    "Retrying rotation (attempt {}/{}) after {}ms",
                    attempt,
                    self.config.max_attempts,
                    retry_delay.as_millis()
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay = retry_delay.mul_f64(self.config.backoff_rate);
            }

            match self.attempt_once(attempt, settle_delay).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!("Rotation attempt {} failed: {}", attempt, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn attempt_once(
        &self,
        attempt: u32,
        settle_delay: Duration,
    ) -> EngineResult<RotationOutcome> {
        self.set_phase(RotationPhase::Toggling);

        // Address capture is best-effort; an unavailable address source
        // must not block the rotation itself.
        let previous_address = self.connectivity.external_address().await.unwrap_or(None);

        self.connectivity.disable().await?;
        tokio::time::sleep(settle_delay).await;
        self.connectivity.enable().await?;

        self.set_phase(RotationPhase::Verifying);
        self.wait_for_restoration().await?;

        let new_address = self.connectivity.external_address().await.unwrap_or(None);
        let address_changed = match (&previous_address, &new_address) {
            (Some(prev), Some(new)) => Some(prev != new),
            _ => None,
        };

        if address_changed == Some(false) {
            warn!(
                "Connectivity restored but external address unchanged ({:?})",
                new_address
            );
        }

        Ok(RotationOutcome {
            previous_address,
            new_address,
            address_changed,
            attempts: attempt,
        })
    }

    /// Poll for connectivity restoration, bounded by the restore timeout.
    async fn wait_for_restoration(&self) -> EngineResult<()> {
        let deadline = Instant::now() + self.config.restore_timeout;
        loop {
            if self.connectivity.is_connected().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(EngineError::rotation_failed(format!(
                    "connectivity not restored within {}ms",
                    self.config.restore_timeout.as_millis()
                )));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn set_phase(&self, phase: RotationPhase) {
        *self.phase.lock().unwrap() = phase;
    }

    fn emit(&self, event: RotationEvent) {
        if let Some(sender) = self.events.lock().unwrap().as_ref() {
            // A dropped receiver is not an error; the listener was replaced
            // or the session is shutting down.
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Fake connectivity with scriptable restoration behavior.
    struct FakeConnectivity {
        disable_calls: AtomicUsize,
        enable_calls: AtomicUsize,
        connected_after_enable: bool,
        addresses: Mutex<Vec<&'static str>>,
    }

    impl FakeConnectivity {
        fn new(connected_after_enable: bool) -> Self {
            Self {
                disable_calls: AtomicUsize::new(0),
                enable_calls: AtomicUsize::new(0),
                connected_after_enable,
                addresses: Mutex::new(vec!["203.0.113.7", "203.0.113.9"]),
            }
        }
    }

    #[async_trait]
    impl Connectivity for FakeConnectivity {
        async fn disable(&self) -> EngineResult<()> {
            self.disable_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn enable(&self) -> EngineResult<()> {
            self.enable_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn is_connected(&self) -> bool {
            self.connected_after_enable
        }

        async fn external_address(&self) -> EngineResult<Option<String>> {
            let mut addresses = self.addresses.lock().unwrap();
            if addresses.is_empty() {
                Ok(None)
            } else {
                Ok(Some(addresses.remove(0).to_string()))
            }
        }
    }

    fn fast_config() -> RotationConfig {
        RotationConfig {
            settle_delay: Duration::from_millis(10),
            restore_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            max_attempts: 2,
            retry_delay: Duration::from_millis(10),
            backoff_rate: 2.0,
        }
    }

    #[tokio::test]
    async fn test_rotation_success_reports_address_change() {
        let connectivity = Arc::new(FakeConnectivity::new(true));
        let rotator = IdentityRotator::new(connectivity.clone(), fast_config());

        let outcome = rotator.rotate().await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.address_changed, Some(true));
        assert_eq!(rotator.phase(), RotationPhase::Done);
        assert_eq!(connectivity.disable_calls.load(Ordering::SeqCst), 1);
        assert_eq!(connectivity.enable_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rotation_fails_when_connectivity_never_restores() {
        let connectivity = Arc::new(FakeConnectivity::new(false));
        let rotator = IdentityRotator::new(connectivity.clone(), fast_config());

        let err = rotator.rotate().await.unwrap_err();
        assert!(matches!(err, EngineError::RotationFailed { .. }));
        assert_eq!(rotator.phase(), RotationPhase::Failed);
        // Both attempts toggled the connection
        assert_eq!(connectivity.disable_calls.load(Ordering::SeqCst), 2);

        rotator.reset_state();
        assert_eq!(rotator.phase(), RotationPhase::Idle);
    }

    #[tokio::test]
    async fn test_concurrent_rotate_is_rejected() {
        let connectivity = Arc::new(FakeConnectivity::new(true));
        let mut config = fast_config();
        config.settle_delay = Duration::from_millis(200);
        let rotator = Arc::new(IdentityRotator::new(connectivity.clone(), config));

        let first = {
            let rotator = Arc::clone(&rotator);
            tokio::spawn(async move { rotator.rotate().await })
        };

        // Give the first rotation time to enter its settle delay.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = rotator.rotate().await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyInProgress { .. }));

        first.await.unwrap().unwrap();
        // The rejected call must not have toggled a second time.
        assert_eq!(connectivity.disable_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rotation_events_are_emitted() {
        let connectivity = Arc::new(FakeConnectivity::new(true));
        let rotator = IdentityRotator::new(connectivity, fast_config());

        let (tx, mut rx) = mpsc::unbounded_channel();
        rotator.set_event_sender(Some(tx));

        rotator.rotate().await.unwrap();

        assert_eq!(rx.recv().await, Some(RotationEvent::OperationStarted));
        assert_eq!(
            rx.recv().await,
            Some(RotationEvent::OperationEnded { success: true })
        );
    }
}
