//! SchedulerActor - internal actor that owns the schedule.
//!
//! One task owns the entry vector and the firing timer. Commands arrive
//! from the handle; the armed deadline is the next unfired entry's fire
//! time, so pause/stop cancel it by state change alone.

use super::commands::SchedulerCommand;
use crate::schedule::{DistributionPattern, TrafficSchedule};
use crate::types::{DistributionEvent, DistributionProgress, DistributionState};
use chrono::{DateTime, Utc};
use drono_common::{EngineError, EngineResult};
use drono_session::SessionController;
use drono_snapshot::{DistributionSnapshot, SnapshotStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Backoff before re-attempting a due entry whose delegation collided
/// with an iteration still in flight.
const DELEGATION_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// One slot of the computed schedule with its absolute fire time.
struct ScheduleEntry {
    index: u32,
    fire_at: Instant,
    fired: bool,
}

/// Internal actor struct that owns the scheduler state.
pub(super) struct SchedulerActor {
    state: DistributionState,
    schedule: Option<TrafficSchedule>,
    entries: Vec<ScheduleEntry>,
    /// Wall-clock start of the window (persisted in the snapshot).
    started_at: Option<DateTime<Utc>>,
    pause_started: Option<Instant>,
    /// Set when a due entry collided with an in-flight iteration.
    retry_at: Option<Instant>,
    controller: SessionController,
    snapshots: Arc<dyn SnapshotStore>,
    events_tx: Option<mpsc::UnboundedSender<DistributionEvent>>,
}

impl SchedulerActor {
    pub(super) fn new(controller: SessionController, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            state: DistributionState::Unconfigured,
            schedule: None,
            entries: Vec::new(),
            started_at: None,
            pause_started: None,
            retry_at: None,
            controller,
            snapshots,
            events_tx: None,
        }
    }

    /// Main event loop: commands plus the firing timer on the next
    /// unfired entry (armed only while running).
    pub(super) async fn run(mut self, mut cmd_rx: mpsc::Receiver<SchedulerCommand>) {
        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                biased;

                maybe_cmd = cmd_rx.recv() => {
                    match maybe_cmd {
                        None => {
                            info!("Command channel closed; scheduler actor exiting");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }

                _ = Self::delay_wait(deadline), if deadline.is_some() => {
                    self.fire_due_entries().await;
                }
            }
        }
    }

    async fn delay_wait(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// The next instant the timer must wake at, if any.
    fn next_deadline(&self) -> Option<Instant> {
        if self.state != DistributionState::Running {
            return None;
        }
        let next = self.entries.iter().find(|e| !e.fired)?;
        Some(match self.retry_at {
            Some(retry_at) => next.fire_at.max(retry_at),
            None => next.fire_at,
        })
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        use SchedulerCommand::*;

        match cmd {
            Configure {
                total,
                window_hours,
                pattern,
                resp,
            } => {
                let _ = resp.send(self.handle_configure(total, window_hours, pattern));
            }
            Start { resp } => {
                let _ = resp.send(self.handle_start().await);
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
            Restore { resp } => {
                let _ = resp.send(self.handle_restore().await);
            }
            Subscribe { resp } => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.events_tx = Some(tx);
                let _ = resp.send(rx);
            }
            GetState { resp } => {
                let _ = resp.send(self.state);
            }
            GetProgress { resp } => {
                let _ = resp.send(self.progress());
            }
        }
    }

    fn handle_configure(
        &mut self,
        total: u32,
        window_hours: u32,
        pattern: DistributionPattern,
    ) -> EngineResult<()> {
        if matches!(
            self.state,
            DistributionState::Running | DistributionState::Paused
        ) {
            return Err(EngineError::invalid_transition(
                "configure_schedule",
                self.state.to_string(),
            ));
        }

        let schedule = TrafficSchedule::generate(total, window_hours, pattern)?;
        info!(
            "Configured schedule: {} requests over {} hours using {}",
            total,
            window_hours,
            schedule.pattern()
        );

        self.schedule = Some(schedule);
        self.entries.clear();
        self.retry_at = None;
        self.state = DistributionState::Configured;
        Ok(())
    }

    async fn handle_start(&mut self) -> EngineResult<()> {
        if matches!(
            self.state,
            DistributionState::Running | DistributionState::Paused
        ) {
            return Err(EngineError::invalid_transition(
                "start_distribution",
                self.state.to_string(),
            ));
        }
        let Some(schedule) = &self.schedule else {
            return Err(EngineError::invalid_transition(
                "start_distribution",
                self.state.to_string(),
            ));
        };

        // (Re)build absolute fire times from the computed offsets; the
        // window starts now.
        let now = Instant::now();
        self.entries = schedule
            .offsets()
            .iter()
            .enumerate()
            .map(|(i, offset)| ScheduleEntry {
                index: i as u32,
                fire_at: now + *offset,
                fired: false,
            })
            .collect();

        self.started_at = Some(Utc::now());
        self.pause_started = None;
        self.retry_at = None;
        self.state = DistributionState::Running;
        info!("Started traffic distribution ({} entries)", self.entries.len());

        self.save_snapshot().await;
        self.emit_status();
        Ok(())
    }

    async fn handle_pause(&mut self) -> EngineResult<()> {
        if self.state != DistributionState::Running {
            return Err(EngineError::invalid_transition(
                "pause_distribution",
                self.state.to_string(),
            ));
        }

        self.pause_started = Some(Instant::now());
        self.state = DistributionState::Paused;
        info!("Paused traffic distribution at {}", self.fired_count());

        self.save_snapshot().await;
        self.emit_status();
        Ok(())
    }

    async fn handle_resume(&mut self) -> EngineResult<()> {
        if self.state != DistributionState::Paused {
            return Err(EngineError::invalid_transition(
                "resume_distribution",
                self.state.to_string(),
            ));
        }

        // Shift every unfired entry forward by the pause duration so the
        // configured shape is preserved relative to resumption.
        if let Some(pause_started) = self.pause_started.take() {
            let shift = Instant::now().saturating_duration_since(pause_started);
            for entry in self.entries.iter_mut().filter(|e| !e.fired) {
                entry.fire_at += shift;
            }
            debug!("Shifted unfired entries forward by {}ms", shift.as_millis());
        }

        self.state = DistributionState::Running;
        info!("Resumed traffic distribution at {}", self.fired_count());

        self.save_snapshot().await;
        self.emit_status();
        Ok(())
    }

    async fn handle_stop(&mut self) -> EngineResult<()> {
        if matches!(
            self.state,
            DistributionState::Unconfigured
                | DistributionState::Completed
                | DistributionState::Stopped
        ) {
            // Nothing running; stop is idempotent.
            return Ok(());
        }

        // Discard remaining entries, keep fired ones for progress queries.
        self.entries.retain(|e| e.fired);
        self.pause_started = None;
        self.retry_at = None;
        self.state = DistributionState::Stopped;
        info!("Stopped traffic distribution");

        if let Err(e) = self.snapshots.clear_distribution().await {
            warn!("Failed to clear distribution snapshot: {}", e);
        }
        self.emit_status();
        self.events_tx = None;
        Ok(())
    }

    async fn handle_restore(&mut self) -> EngineResult<bool> {
        if matches!(
            self.state,
            DistributionState::Running | DistributionState::Paused
        ) {
            warn!("Cannot restore: a distribution is already active");
            return Ok(false);
        }

        let Some(snapshot) = self.snapshots.load_distribution().await? else {
            debug!("No distribution snapshot to restore");
            return Ok(false);
        };
        if !snapshot.is_consistent() || snapshot.current_index >= snapshot.total_entries {
            warn!("Ignoring inconsistent distribution snapshot");
            return Ok(false);
        }

        let Some(pattern) = Self::pattern_from_snapshot(&snapshot) else {
            warn!(
                "Ignoring distribution snapshot with unknown pattern '{}'",
                snapshot.pattern_name
            );
            return Ok(false);
        };

        let schedule =
            TrafficSchedule::generate(snapshot.total_entries, snapshot.window_hours, pattern)?;

        // Unfired entries keep their relative gaps; the first one is due
        // the moment the operator resumes.
        let now = Instant::now();
        let offsets = schedule.offsets();
        let base = offsets[snapshot.current_index as usize];
        self.entries = offsets
            .iter()
            .enumerate()
            .map(|(i, offset)| ScheduleEntry {
                index: i as u32,
                fire_at: now + offset.saturating_sub(base),
                fired: (i as u32) < snapshot.current_index,
            })
            .collect();

        self.schedule = Some(schedule);
        self.started_at = Some(snapshot.start_time);
        // Restoration is conservative: always paused. The restore instant
        // starts the pause interval the next resume will shift by.
        self.pause_started = Some(now);
        self.retry_at = None;
        self.state = DistributionState::Paused;

        info!(
            "Restored distribution state: {}/{} entries fired, pattern={}, paused",
            snapshot.current_index, snapshot.total_entries, snapshot.pattern_name
        );
        self.emit_status();
        Ok(true)
    }

    fn pattern_from_snapshot(snapshot: &DistributionSnapshot) -> Option<DistributionPattern> {
        match snapshot.pattern_name.as_str() {
            "uniform" => Some(DistributionPattern::Uniform),
            "peak_weighted" => Some(DistributionPattern::PeakWeighted {
                peak_start_hour: snapshot.peak_start_hour?,
                peak_end_hour: snapshot.peak_end_hour?,
                weight: snapshot.peak_weight?,
            }),
            _ => None,
        }
    }

    /// Fire every entry whose time has passed, in catch-up order, then
    /// announce the next pending entry.
    async fn fire_due_entries(&mut self) {
        self.retry_at = None;
        let total = self.entries.len() as u32;

        while self.state == DistributionState::Running {
            let Some(pos) = self.entries.iter().position(|e| !e.fired) else {
                break;
            };
            if self.entries[pos].fire_at > Instant::now() {
                break;
            }

            let index = self.entries[pos].index;
            match self.controller.trigger_iteration().await {
                Ok(()) => {
                    self.entries[pos].fired = true;
                    debug!("Fired entry {}/{}", index + 1, total);
                }
                Err(EngineError::AlreadyInProgress { .. }) => {
                    // The previous iteration is still in flight; the entry
                    // stays due and is retried shortly.
                    self.retry_at = Some(Instant::now() + DELEGATION_RETRY_BACKOFF);
                    debug!("Entry {} deferred: iteration in flight", index + 1);
                    break;
                }
                Err(e) => {
                    // The session is not accepting iterations (stopped or
                    // errored out from under the scheduler); the slot is
                    // consumed, matching the fire-and-forget original.
                    warn!("Entry {} could not be delegated: {}", index + 1, e);
                    self.entries[pos].fired = true;
                }
            }
        }

        if self.state != DistributionState::Running {
            return;
        }

        match self.entries.iter().find(|e| !e.fired) {
            None => self.complete().await,
            Some(next) => {
                let fire_in = next.fire_at.saturating_duration_since(Instant::now());
                self.emit(DistributionEvent::EntryScheduled {
                    fire_in,
                    index: next.index,
                    total,
                });
                debug!(
                    "Scheduled entry {}/{} in {}ms",
                    next.index + 1,
                    total,
                    fire_in.as_millis()
                );
            }
        }
    }

    async fn complete(&mut self) {
        self.state = DistributionState::Completed;
        info!("Traffic distribution completed");

        if let Err(e) = self.snapshots.clear_distribution().await {
            warn!("Failed to clear distribution snapshot: {}", e);
        }
        self.emit_status();
    }

    fn fired_count(&self) -> u32 {
        self.entries.iter().filter(|e| e.fired).count() as u32
    }

    fn percent(&self) -> u8 {
        match &self.schedule {
            Some(schedule) if schedule.total() > 0 => {
                ((self.fired_count() as u64 * 100) / schedule.total() as u64) as u8
            }
            _ => 0,
        }
    }

    fn progress(&self) -> Option<DistributionProgress> {
        let schedule = self.schedule.as_ref()?;
        let fired = self.fired_count();
        let total = schedule.total();
        let unfired = total.saturating_sub(fired);
        let estimated_remaining = schedule.average_gap() * unfired;
        let estimated_completion = Utc::now()
            + chrono::Duration::from_std(estimated_remaining)
                .unwrap_or_else(|_| chrono::Duration::zero());

        Some(DistributionProgress {
            fired,
            total,
            percent: self.percent(),
            estimated_remaining,
            estimated_completion,
        })
    }

    async fn save_snapshot(&self) {
        let Some(schedule) = &self.schedule else {
            return;
        };
        let (peak_start_hour, peak_end_hour, peak_weight) = match schedule.pattern() {
            DistributionPattern::Uniform => (None, None, None),
            DistributionPattern::PeakWeighted {
                peak_start_hour,
                peak_end_hour,
                weight,
            } => (Some(*peak_start_hour), Some(*peak_end_hour), Some(*weight)),
        };

        let snapshot = DistributionSnapshot {
            current_index: self.fired_count(),
            total_entries: schedule.total(),
            start_time: self.started_at.unwrap_or_else(Utc::now),
            paused: self.state == DistributionState::Paused,
            window_hours: schedule.window_hours(),
            pattern_name: schedule.pattern().name().to_string(),
            peak_start_hour,
            peak_end_hour,
            peak_weight,
        };

        if let Err(e) = self.snapshots.save_distribution(&snapshot).await {
            warn!("Failed to persist distribution snapshot: {}", e);
        }
    }

    fn emit_status(&self) {
        self.emit(DistributionEvent::StatusChanged {
            running: self.state == DistributionState::Running,
            progress: self.percent(),
        });
    }

    fn emit(&self, event: DistributionEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event);
        }
    }
}
