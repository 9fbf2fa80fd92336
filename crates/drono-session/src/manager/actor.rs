//! SessionActor - internal actor that owns the session.
//!
//! The actor runs in a single task and processes commands from the
//! handle. It owns the session state exclusively; nothing outside this
//! module reads or writes it directly.
//!
//! The inter-iteration delay is an actor-owned deadline inside the select
//! loop, so pause/stop cancel it by clearing a field. Rotation and fetch
//! run in a spawned worker task (one at a time) that reports back over
//! the completion channel, keeping the actor responsive to commands while
//! a fetch is in flight.

use super::commands::ControllerCommand;
use crate::config::SessionConfig;
use crate::session::Session;
use chrono::Utc;
use drono_common::{EngineError, EngineResult, RotationEvent, SessionEvent, SessionMode};
use drono_fetch::FetchClient;
use drono_identity::IdentityRotator;
use drono_session_state::SessionStatus;
use drono_snapshot::SnapshotStore;
use drono_timing::TimingDistributor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of one iteration's worker task (sent back to the actor).
pub(super) struct IterationCompleted {
    pub fetch_ok: bool,
    pub rotation_attempted: bool,
    pub rotation_ok: bool,
    /// Address observed after a successful rotation, if any.
    pub new_address: Option<String>,
}

/// Internal actor struct that owns the session state.
pub(super) struct SessionActor {
    session: Option<Session>,
    timing: TimingDistributor,
    fetch_client: Arc<dyn FetchClient>,
    rotator: Arc<IdentityRotator>,
    snapshots: Arc<dyn SnapshotStore>,
    /// Current event listener (replaced by Subscribe, dropped on stop).
    events_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
    /// Sender handed to iteration worker tasks.
    completed_tx: mpsc::Sender<IterationCompleted>,
    /// Deadline of the armed inter-iteration delay, if any.
    delay_deadline: Option<Instant>,
    /// Whether an iteration worker task is currently running.
    iteration_in_flight: bool,
}

impl SessionActor {
    pub(super) fn new(
        fetch_client: Arc<dyn FetchClient>,
        rotator: Arc<IdentityRotator>,
        snapshots: Arc<dyn SnapshotStore>,
        completed_tx: mpsc::Sender<IterationCompleted>,
    ) -> Self {
        Self {
            session: None,
            timing: TimingDistributor::default(),
            fetch_client,
            rotator,
            snapshots,
            events_tx: None,
            completed_tx,
            delay_deadline: None,
            iteration_in_flight: false,
        }
    }

    /// Main event loop for the actor.
    ///
    /// Listens to:
    /// - External commands (handle -> actor)
    /// - Iteration completions (worker task -> actor)
    /// - Rotation start/end events (rotator -> actor, forwarded outward)
    /// - The armed inter-iteration delay deadline
    ///
    /// Completions are processed with priority so in-flight bookkeeping is
    /// cleared before new commands race it. The actor terminates when all
    /// handles are dropped (command channel closed).
    pub(super) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ControllerCommand>,
        mut completed_rx: mpsc::Receiver<IterationCompleted>,
        mut rotation_rx: mpsc::UnboundedReceiver<RotationEvent>,
    ) {
        // Guards against busy-looping on closed channels.
        let mut rotation_closed = false;
        let mut completion_closed = false;

        loop {
            let deadline = self.delay_deadline;

            tokio::select! {
                biased;

                maybe_completed = completed_rx.recv(), if !completion_closed => {
                    match maybe_completed {
                        Some(completed) => self.handle_iteration_completed(completed).await,
                        // Cannot happen while the actor holds a sender
                        // clone; stop polling if it ever does.
                        None => completion_closed = true,
                    }
                }

                maybe_cmd = cmd_rx.recv() => {
                    match maybe_cmd {
                        None => {
                            info!("Command channel closed; session actor exiting");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }

                maybe_event = rotation_rx.recv(), if !rotation_closed => {
                    match maybe_event {
                        Some(event) => self.forward_rotation_event(event),
                        None => rotation_closed = true,
                    }
                }

                _ = Self::delay_wait(deadline), if deadline.is_some() => {
                    self.delay_deadline = None;
                    self.launch_iteration();
                }
            }
        }
    }

    /// Cancellable wait on the armed delay deadline.
    async fn delay_wait(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Handle a single command.
    async fn handle_command(&mut self, cmd: ControllerCommand) {
        use ControllerCommand::*;

        match cmd {
            Start { config, resp } => {
                let _ = resp.send(self.handle_start(config));
            }
            Pause { resp } => {
                let _ = resp.send(self.handle_pause().await);
            }
            Resume { resp } => {
                let _ = resp.send(self.handle_resume().await);
            }
            Stop { resp } => {
                let _ = resp.send(self.handle_stop().await);
            }
            TriggerIteration { resp } => {
                let _ = resp.send(self.handle_trigger());
            }
            RestoreFromSnapshot { config, resp } => {
                let _ = resp.send(self.handle_restore(config).await);
            }
            Subscribe { resp } => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.events_tx = Some(tx);
                let _ = resp.send(rx);
            }
            GetInfo { resp } => {
                let _ = resp.send(self.session.as_ref().map(|s| s.info()));
            }
            GetStatus { resp } => {
                let _ = resp.send(self.current_status());
            }
        }
    }

    fn current_status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map(|s| s.status())
            .unwrap_or(SessionStatus::Idle)
    }

    fn handle_start(&mut self, config: SessionConfig) -> EngineResult<()> {
        config.validate()?;

        if let Some(session) = &self.session {
            if session.status().is_active() {
                return Err(EngineError::invalid_transition(
                    "start",
                    session.status().to_string(),
                ));
            }
        }

        let mut session = Session::new(config);
        session.machine.transition_to_running()?;

        self.timing
            .set_delay_range(session.config.min_delay, session.config.max_delay);

        let total = session.config.total_iterations;
        let mode = session.config.mode;
        info!(
            "Starting session: {} iterations against {} ({} mode)",
            total, session.config.target_url, mode
        );

        self.session = Some(session);
        self.emit(SessionEvent::StatusChanged {
            status: SessionStatus::Running.to_string(),
        });
        self.emit(SessionEvent::Progress { current: 0, total });

        if mode == SessionMode::Continuous {
            self.arm_delay();
        }
        Ok(())
    }

    async fn handle_pause(&mut self) -> EngineResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(EngineError::invalid_transition(
                "pause",
                SessionStatus::Idle.to_string(),
            ));
        };
        if !session.machine.can_pause() {
            return Err(EngineError::invalid_transition(
                "pause",
                session.status().to_string(),
            ));
        }

        session.machine.transition_to_paused()?;
        session.pause_started_at = Some(Utc::now());
        let snapshot = session.snapshot();
        info!(
            "Session paused at {}/{}",
            session.current_iteration, session.config.total_iterations
        );

        // Halt scheduling of the next iteration; an in-flight fetch is
        // allowed to finish.
        self.delay_deadline = None;

        if let Err(e) = self.snapshots.save_session(&snapshot).await {
            warn!("Failed to persist snapshot on pause: {}", e);
        }
        self.emit(SessionEvent::StatusChanged {
            status: SessionStatus::Paused.to_string(),
        });
        Ok(())
    }

    async fn handle_resume(&mut self) -> EngineResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(EngineError::invalid_transition(
                "resume",
                SessionStatus::Idle.to_string(),
            ));
        };
        if !session.machine.can_resume() {
            return Err(EngineError::invalid_transition(
                "resume",
                session.status().to_string(),
            ));
        }

        session.machine.transition_to_running()?;
        if let Some(pause_started) = session.pause_started_at.take() {
            let paused_for = (Utc::now() - pause_started)
                .to_std()
                .unwrap_or(Duration::ZERO);
            session.accumulated_paused += paused_for;
        }
        // Always rotate on the first iteration after a resume.
        session.force_rotation = true;

        let snapshot = session.snapshot();
        let mode = session.config.mode;
        info!(
            "Session resumed at {}/{} (paused for {}ms total)",
            session.current_iteration,
            session.config.total_iterations,
            session.accumulated_paused.as_millis()
        );

        if let Err(e) = self.snapshots.save_session(&snapshot).await {
            warn!("Failed to persist snapshot on resume: {}", e);
        }
        self.emit(SessionEvent::StatusChanged {
            status: SessionStatus::Running.to_string(),
        });

        if mode == SessionMode::Continuous && !self.iteration_in_flight {
            self.arm_delay();
        }
        Ok(())
    }

    async fn handle_stop(&mut self) -> EngineResult<()> {
        let Some(session) = self.session.as_mut() else {
            // Nothing to stop; stop is idempotent.
            return Ok(());
        };
        if session.status().is_terminal() {
            return Ok(());
        }

        session.machine.transition_to_stopped()?;
        info!(
            "Session stopped at {}/{}",
            session.current_iteration, session.config.total_iterations
        );

        self.delay_deadline = None;
        // Release the rotator if a stop interrupted a rotation mid-flight.
        self.rotator.reset_state();

        self.emit(SessionEvent::StatusChanged {
            status: SessionStatus::Stopped.to_string(),
        });
        // Close the progress channel: no callbacks after stop has quiesced.
        self.events_tx = None;

        if let Err(e) = self.snapshots.clear_session().await {
            warn!("Failed to clear snapshot on stop: {}", e);
        }
        Ok(())
    }

    fn handle_trigger(&mut self) -> EngineResult<()> {
        let status = self.current_status();
        if status != SessionStatus::Running {
            return Err(EngineError::invalid_transition(
                "trigger_iteration",
                status.to_string(),
            ));
        }
        if self.iteration_in_flight {
            return Err(EngineError::already_in_progress("iteration"));
        }

        // The caller is the timing source here; drop any armed delay.
        self.delay_deadline = None;
        self.launch_iteration();
        Ok(())
    }

    async fn handle_restore(&mut self, config: SessionConfig) -> EngineResult<bool> {
        if let Some(session) = &self.session {
            if session.status().is_active() {
                warn!("Cannot restore: a session is already active");
                return Ok(false);
            }
        }
        config.validate()?;

        let Some(snapshot) = self.snapshots.load_session().await? else {
            debug!("No session snapshot to restore");
            return Ok(false);
        };
        if !snapshot.is_consistent() {
            warn!("Ignoring inconsistent session snapshot");
            return Ok(false);
        }

        let session = Session::from_snapshot(&snapshot, config);
        self.timing
            .set_delay_range(session.config.min_delay, session.config.max_delay);

        let current = session.current_iteration;
        let total = session.config.total_iterations;
        info!("Restored session: progress={}/{}, paused", current, total);

        self.session = Some(session);
        self.emit(SessionEvent::Progress { current, total });
        self.emit(SessionEvent::StatusChanged {
            status: SessionStatus::Paused.to_string(),
        });
        Ok(true)
    }

    /// Arm the delay before the next iteration.
    fn arm_delay(&mut self) {
        let interval = self.timing.next_interval();
        debug!("Waiting {}ms before next iteration", interval.as_millis());
        self.delay_deadline = Some(Instant::now() + interval);
    }

    /// Spawn the worker task for one iteration (rotation + fetch).
    fn launch_iteration(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        // Pause/stop may have been observed between arming and firing.
        if session.status() != SessionStatus::Running {
            debug!(
                "Skipping iteration launch in state {}",
                session.status()
            );
            return;
        }
        if self.iteration_in_flight {
            return;
        }
        self.iteration_in_flight = true;

        let iteration_number = session.current_iteration + 1;
        let total = session.config.total_iterations;
        info!("Starting iteration {}/{}", iteration_number, total);

        let target = session.config.target_url.clone();
        let profile = session.next_profile();
        let rotate = session.should_rotate_next();
        let settle_delay = session.config.rotation_delay;
        debug!(
            "Using identity profile: {}, {}, {}",
            profile.platform, profile.client_type, profile.tier
        );

        let fetch_client = Arc::clone(&self.fetch_client);
        let rotator = Arc::clone(&self.rotator);
        let completed_tx = self.completed_tx.clone();

        tokio::spawn(async move {
            let mut rotation_attempted = false;
            let mut rotation_ok = true;
            let mut new_address = None;

            if rotate {
                rotation_attempted = true;
                match rotator.rotate_with_settle(settle_delay).await {
                    Ok(outcome) => {
                        new_address = outcome.new_address;
                    }
                    Err(e) => {
                        // Rotation is best-effort: the iteration proceeds
                        // without a fresh identity.
                        rotation_ok = false;
                        warn!("Identity rotation failed, proceeding anyway: {}", e);
                    }
                }
            }

            let fetch_ok = match fetch_client.fetch(&target, &profile).await {
                Ok(report) => {
                    debug!(
                        "Fetch returned status {} in {}ms",
                        report.status_code,
                        report.elapsed.as_millis()
                    );
                    true
                }
                Err(e) => {
                    warn!("Fetch error: {}", e);
                    false
                }
            };

            let completed = IterationCompleted {
                fetch_ok,
                rotation_attempted,
                rotation_ok,
                new_address,
            };
            if completed_tx.send(completed).await.is_err() {
                debug!("Session actor gone before iteration completion was reported");
            }
        });
    }

    /// Process a finished iteration: advance progress, account failures,
    /// and either complete the session or arm the next delay.
    async fn handle_iteration_completed(&mut self, completed: IterationCompleted) {
        self.iteration_in_flight = false;

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let status = session.status();
        if !matches!(status, SessionStatus::Running | SessionStatus::Paused) {
            // Stop quiesced the session while the worker was finishing;
            // its result is discarded and no events are emitted.
            debug!("Discarding iteration completion in state {}", status);
            return;
        }

        // The iteration is consumed regardless of the fetch result; a
        // failed fetch is logged but never retried under the same index.
        session.current_iteration += 1;
        session.force_rotation = false;
        if let Some(address) = completed.new_address {
            session.used_addresses.insert(address);
        }

        let failed = !completed.fetch_ok || (completed.rotation_attempted && !completed.rotation_ok);
        if failed {
            session.consecutive_failures += 1;
        } else {
            session.consecutive_failures = 0;
        }

        let current = session.current_iteration;
        let total = session.config.total_iterations;
        let mode = session.config.mode;
        let failures = session.consecutive_failures;
        let failure_limit = session.config.max_consecutive_failures;

        info!(
            "Iteration {}/{} completed{}",
            current,
            total,
            if failed { " with errors" } else { "" }
        );
        self.emit(SessionEvent::Progress { current, total });

        // Strict mode: abort after the configured consecutive failures.
        if let Some(limit) = failure_limit {
            if failures >= limit && current < total {
                warn!(
                    "Aborting session after {} consecutive failed iterations",
                    failures
                );
                if let Some(session) = self.session.as_mut() {
                    let _ = session
                        .machine
                        .transition_to_error(format!("{} consecutive failures", failures));
                }
                self.delay_deadline = None;
                self.emit(SessionEvent::StatusChanged {
                    status: SessionStatus::Error.to_string(),
                });
                return;
            }
        }

        if current >= total {
            self.complete_session().await;
            return;
        }

        if status == SessionStatus::Running && mode == SessionMode::Continuous {
            self.arm_delay();
        }
    }

    async fn complete_session(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.machine.transition_to_completed() {
                warn!("Could not mark session completed: {}", e);
                return;
            }
            info!(
                "Session completed: {} iterations, {} identity rotations observed, {}ms paused",
                session.current_iteration,
                session.used_addresses.len(),
                session.accumulated_paused.as_millis()
            );
        }

        self.delay_deadline = None;
        self.emit(SessionEvent::StatusChanged {
            status: SessionStatus::Completed.to_string(),
        });
        if let Err(e) = self.snapshots.clear_session().await {
            warn!("Failed to clear snapshot after completion: {}", e);
        }
    }

    fn forward_rotation_event(&self, event: RotationEvent) {
        let mapped = match event {
            RotationEvent::OperationStarted => SessionEvent::RotationStarted,
            RotationEvent::OperationEnded { success } => SessionEvent::RotationEnded { success },
        };
        self.emit(mapped);
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events_tx {
            // A dropped receiver means the listener went away; not an error.
            let _ = tx.send(event);
        }
    }
}
