//! Internal command protocol for the distribution scheduler actor.

use crate::schedule::DistributionPattern;
use crate::types::{DistributionEvent, DistributionProgress, DistributionState};
use drono_common::EngineResult;
use tokio::sync::{mpsc, oneshot};

/// Command messages for the scheduler actor. Internal to the scheduler
/// module; external code interacts via `DistributionScheduler` methods.
pub(super) enum SchedulerCommand {
    /// Compute a schedule from the pattern
    Configure {
        total: u32,
        window_hours: u32,
        pattern: DistributionPattern,
        resp: oneshot::Sender<EngineResult<()>>,
    },
    /// Arm the timer and start firing entries
    Start {
        resp: oneshot::Sender<EngineResult<()>>,
    },
    /// Suspend firing; unfired entries shift forward on resume
    Pause {
        resp: oneshot::Sender<EngineResult<()>>,
    },
    /// Resume firing, preserving the configured shape relative to now
    Resume {
        resp: oneshot::Sender<EngineResult<()>>,
    },
    /// Discard remaining entries
    Stop {
        resp: oneshot::Sender<EngineResult<()>>,
    },
    /// Reconstruct a paused distribution from the persisted snapshot
    Restore {
        resp: oneshot::Sender<EngineResult<bool>>,
    },
    /// Replace the event listener with a fresh channel
    Subscribe {
        resp: oneshot::Sender<mpsc::UnboundedReceiver<DistributionEvent>>,
    },
    /// Get the current scheduler state
    GetState {
        resp: oneshot::Sender<DistributionState>,
    },
    /// Get progress and completion estimates
    GetProgress {
        resp: oneshot::Sender<Option<DistributionProgress>>,
    },
}
