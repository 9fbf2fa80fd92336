//! DistributionScheduler handle - public API for the scheduler actor.
//!
//! A lightweight, cloneable handle; all methods send commands to the
//! internal actor and await responses.

use super::commands::SchedulerCommand;
use crate::schedule::DistributionPattern;
use crate::types::{DistributionEvent, DistributionProgress, DistributionState};
use drono_common::{EngineError, EngineResult};
use tokio::sync::{mpsc, oneshot};

/// Distribution scheduler handle.
#[derive(Clone)]
pub struct DistributionScheduler {
    pub(super) cmd_tx: mpsc::Sender<SchedulerCommand>,
}

impl DistributionScheduler {
    fn map_send_err(context: &str) -> EngineError {
        EngineError::channel_closed(format!("{}: scheduler unavailable", context))
    }

    fn map_recv_err(context: &str) -> EngineError {
        EngineError::channel_closed(format!("{}: scheduler dropped response", context))
    }

    /// Compute a schedule spreading `total` entries across `window_hours`
    /// following `pattern`.
    ///
    /// Valid while no distribution is running or paused. The computed
    /// entries are strictly increasing, start at the window start, stay
    /// within the window, and number exactly `total`.
    pub async fn configure_schedule(
        &self,
        total: u32,
        window_hours: u32,
        pattern: DistributionPattern,
    ) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Configure {
                total,
                window_hours,
                pattern,
                resp: tx,
            })
            .await
            .map_err(|_| Self::map_send_err("configure_schedule"))?;
        rx.await.map_err(|_| Self::map_recv_err("configure_schedule"))?
    }

    /// Arm the timer: each unfired entry fires at its scheduled time and
    /// delegates exactly one iteration to the session controller
    /// (bypassing the controller's own delay step). Entries already past
    /// now fire immediately in catch-up order.
    pub async fn start_distribution(&self) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Start { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("start_distribution"))?;
        rx.await.map_err(|_| Self::map_recv_err("start_distribution"))?
    }

    /// Suspend firing. Unfired entries are shifted forward by the pause
    /// duration on resume, preserving the configured shape relative to
    /// resumption rather than freezing wall-clock times.
    pub async fn pause_distribution(&self) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Pause { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("pause_distribution"))?;
        rx.await.map_err(|_| Self::map_recv_err("pause_distribution"))?
    }

    /// Resume a paused distribution.
    pub async fn resume_distribution(&self) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Resume { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("resume_distribution"))?;
        rx.await.map_err(|_| Self::map_recv_err("resume_distribution"))?
    }

    /// Stop the distribution, discarding remaining entries and clearing
    /// the persisted distribution snapshot. Idempotent.
    pub async fn stop_distribution(&self) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Stop { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("stop_distribution"))?;
        rx.await.map_err(|_| Self::map_recv_err("stop_distribution"))?
    }

    /// Reconstruct a distribution from the persisted snapshot, always
    /// restoring into `Paused`. Returns whether a valid snapshot existed.
    pub async fn restore_distribution_state(&self) -> EngineResult<bool> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Restore { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("restore_distribution_state"))?;
        rx.await
            .map_err(|_| Self::map_recv_err("restore_distribution_state"))?
    }

    /// Subscribe to scheduler events, replacing any previous listener.
    pub async fn subscribe(&self) -> EngineResult<mpsc::UnboundedReceiver<DistributionEvent>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Subscribe { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("subscribe"))?;
        rx.await.map_err(|_| Self::map_recv_err("subscribe"))
    }

    /// Get the current scheduler state.
    ///
    /// Returns `Unconfigured` when the actor is unavailable.
    pub async fn state(&self) -> DistributionState {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SchedulerCommand::GetState { resp: tx })
            .await
            .is_err()
        {
            return DistributionState::Unconfigured;
        }
        rx.await.unwrap_or(DistributionState::Unconfigured)
    }

    /// Get progress and remaining/completion time estimates, if a schedule
    /// exists.
    pub async fn progress(&self) -> EngineResult<Option<DistributionProgress>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::GetProgress { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("progress"))?;
        rx.await.map_err(|_| Self::map_recv_err("progress"))
    }
}
