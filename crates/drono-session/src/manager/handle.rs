//! SessionController handle - public API for interacting with the session
//! actor.
//!
//! This is a lightweight handle that can be cloned and shared across
//! tasks (a UI thread stopping a background loop, a remote-command relay
//! invoking pause). All methods send commands to the internal actor and
//! await responses.

use super::commands::ControllerCommand;
use crate::config::SessionConfig;
use crate::session::SessionInfo;
use drono_common::{EngineError, EngineResult, SessionEvent};
use drono_session_state::SessionStatus;
use tokio::sync::{mpsc, oneshot};

/// Session controller handle providing the public API by sending commands
/// to the actor.
#[derive(Clone)]
pub struct SessionController {
    pub(super) cmd_tx: mpsc::Sender<ControllerCommand>,
}

impl SessionController {
    /// Map a channel send error to an engine error.
    fn map_send_err(context: &str) -> EngineError {
        EngineError::channel_closed(format!("{}: actor unavailable", context))
    }

    /// Map a oneshot receive error to an engine error.
    fn map_recv_err(context: &str) -> EngineError {
        EngineError::channel_closed(format!("{}: actor dropped response", context))
    }

    /// Start a new session.
    ///
    /// The configuration is validated synchronously; `InvalidConfiguration`
    /// is returned before any state change. If a session is already
    /// `Running` or `Paused` the call fails with `InvalidTransition`
    /// (stop it first). On success the session transitions to `Running`,
    /// progress `(0, total)` is emitted, and the iteration loop runs
    /// asynchronously - this method does not block on iterations.
    pub async fn start(&self, config: SessionConfig) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::Start { config, resp: tx })
            .await
            .map_err(|_| Self::map_send_err("start"))?;
        rx.await.map_err(|_| Self::map_recv_err("start"))?
    }

    /// Pause the session.
    ///
    /// Valid only while `Running`: records the pause start, suspends
    /// scheduling of the next iteration, and persists a snapshot. An
    /// in-flight fetch is allowed to finish; it is the delay/rotation
    /// step before the *next* iteration that is suspended.
    ///
    /// # Errors
    /// - `InvalidTransition` if the session is not `Running` (no state
    ///   change).
    pub async fn pause(&self) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::Pause { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("pause"))?;
        rx.await.map_err(|_| Self::map_recv_err("pause"))?
    }

    /// Resume a paused session.
    ///
    /// Adds the elapsed pause interval to the accumulated paused duration
    /// and re-arms the iteration loop. The first iteration after a resume
    /// always rotates the identity when rotation is enabled.
    ///
    /// # Errors
    /// - `InvalidTransition` if the session is not `Paused`.
    pub async fn resume(&self) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::Resume { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("resume"))?;
        rx.await.map_err(|_| Self::map_recv_err("resume"))?
    }

    /// Stop the session.
    ///
    /// Valid from any non-terminal state and idempotent. Cancels any
    /// pending delay wait, force-clears a stuck rotation, clears the
    /// snapshot, and closes the progress channel. Returns without waiting
    /// for an in-flight iteration to unwind; no further progress events or
    /// fetches are initiated after it returns.
    pub async fn stop(&self) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::Stop { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("stop"))?;
        rx.await.map_err(|_| Self::map_recv_err("stop"))?
    }

    /// Run exactly one iteration now, bypassing the controller's own
    /// delay step. This is the distribution scheduler's entry point: in
    /// scheduled mode the scheduler is the timing source.
    ///
    /// # Errors
    /// - `InvalidTransition` if the session is not `Running`
    /// - `AlreadyInProgress` if an iteration is already in flight
    pub async fn trigger_iteration(&self) -> EngineResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::TriggerIteration { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("trigger_iteration"))?;
        rx.await.map_err(|_| Self::map_recv_err("trigger_iteration"))?
    }

    /// Reconstruct a session from the persisted snapshot.
    ///
    /// Returns `Ok(true)` when a valid snapshot existed. The restored
    /// session is always `Paused` - even when the snapshot recorded a
    /// running session - so the operator must explicitly resume. The
    /// provided config supplies delay bounds and flags; the snapshot
    /// supplies the target and progress bookkeeping.
    pub async fn restore_from_snapshot(&self, config: SessionConfig) -> EngineResult<bool> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::RestoreFromSnapshot { config, resp: tx })
            .await
            .map_err(|_| Self::map_send_err("restore_from_snapshot"))?;
        rx.await
            .map_err(|_| Self::map_recv_err("restore_from_snapshot"))?
    }

    /// Subscribe to session events, replacing any previous listener.
    ///
    /// The previous listener's channel closes immediately; the new channel
    /// closes when the session is stopped, so listeners never dangle.
    pub async fn subscribe(&self) -> EngineResult<mpsc::UnboundedReceiver<SessionEvent>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::Subscribe { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("subscribe"))?;
        rx.await.map_err(|_| Self::map_recv_err("subscribe"))
    }

    /// Get the public projection of the current session, if any.
    pub async fn info(&self) -> EngineResult<Option<SessionInfo>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::GetInfo { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("info"))?;
        rx.await.map_err(|_| Self::map_recv_err("info"))
    }

    /// Get the current session status.
    ///
    /// Returns `Idle` when no session is active.
    pub async fn status(&self) -> SessionStatus {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ControllerCommand::GetStatus { resp: tx })
            .await
            .is_err()
        {
            return SessionStatus::Idle;
        }
        rx.await.unwrap_or(SessionStatus::Idle)
    }
}
