//! Internal command protocol for the session actor.
//!
//! These message types travel between the `SessionController` handle and
//! the `SessionActor`. They are NOT exposed outside the manager module.

use crate::config::SessionConfig;
use crate::session::SessionInfo;
use drono_common::{EngineResult, SessionEvent};
use drono_session_state::SessionStatus;
use tokio::sync::{mpsc, oneshot};

/// Command messages for the session actor.
///
/// This enum is internal to the manager module. External code interacts
/// via `SessionController` methods.
pub(super) enum ControllerCommand {
    /// Validate a configuration and start the iteration loop
    Start {
        config: SessionConfig,
        resp: oneshot::Sender<EngineResult<()>>,
    },
    /// Suspend scheduling of the next iteration
    Pause {
        resp: oneshot::Sender<EngineResult<()>>,
    },
    /// Resume a paused session
    Resume {
        resp: oneshot::Sender<EngineResult<()>>,
    },
    /// Stop the session from any non-terminal state (idempotent)
    Stop {
        resp: oneshot::Sender<EngineResult<()>>,
    },
    /// Run exactly one iteration, bypassing the delay step
    /// (used by the distribution scheduler)
    TriggerIteration {
        resp: oneshot::Sender<EngineResult<()>>,
    },
    /// Reconstruct a paused session from the persisted snapshot
    RestoreFromSnapshot {
        config: SessionConfig,
        resp: oneshot::Sender<EngineResult<bool>>,
    },
    /// Replace the progress listener with a fresh channel
    Subscribe {
        resp: oneshot::Sender<mpsc::UnboundedReceiver<SessionEvent>>,
    },
    /// Get the public projection of the current session
    GetInfo {
        resp: oneshot::Sender<Option<SessionInfo>>,
    },
    /// Get the current session status
    GetStatus {
        resp: oneshot::Sender<SessionStatus>,
    },
}
