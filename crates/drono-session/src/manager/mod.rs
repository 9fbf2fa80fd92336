//! Session Controller - actor-based orchestration of the iteration loop
//!
//! This module owns the session state machine with an actor-style design:
//! - A single event loop owns all mutable session state
//! - A message enum represents commands to the controller
//! - A handle struct provides the public API by sending commands over a
//!   channel
//! - No `Arc<RwLock<Session>>`; external callers read via projections and
//!   mutate via the documented transition methods only
//!
//! ## Single-flow execution
//!
//! The engine is single-flow per session: one iteration, one identity
//! rotation, and one fetch are ever in flight at a time. There is no
//! parallel fan-out across iterations - identity rotation and the shared
//! fetch client are not safe for concurrent use.
//!
//! ## Suspension points and cooperative pause
//!
//! Each iteration has three suspension points: the delay wait, the
//! rotation wait, and the fetch call. The delay wait is an actor-owned
//! deadline in the select loop; `pause()`/`stop()` cancel it by clearing
//! the field. Rotation and fetch run in a worker task whose completion
//! the actor observes, so pause is check-before-commit: an iteration past
//! its last suspension point completes (and reports progress) before
//! pausing takes effect.
//!
//! ## Stop semantics
//!
//! `stop()` is idempotent and safe to call from any task. It signals
//! cancellation, force-clears a stuck rotation, clears the snapshot, and
//! closes the event channel without blocking on the worker's unwind. A
//! worker finishing after stop finds the session terminal and its result
//! is discarded - no further progress events or fetches are initiated.
//!
//! ## Select bias
//!
//! The loop uses a *biased* `tokio::select!`: iteration completions are
//! processed before commands so in-flight bookkeeping is cleared before a
//! racing `trigger_iteration` can observe it; the delay deadline comes
//! last because firing an iteration is the lowest-latency-sensitive
//! branch.

mod actor;
mod commands;
mod handle;

#[cfg(test)]
mod tests;

pub use handle::SessionController;

use actor::{IterationCompleted, SessionActor};
use commands::ControllerCommand;
use drono_common::RotationEvent;
use drono_fetch::FetchClient;
use drono_identity::IdentityRotator;
use drono_snapshot::SnapshotStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

impl SessionController {
    /// Create a session controller with the injected capabilities and
    /// spawn its actor.
    ///
    /// The rotator's event stream is claimed by the controller so rotation
    /// start/end surfaces on the session event channel.
    pub fn new(
        fetch_client: Arc<dyn FetchClient>,
        rotator: Arc<IdentityRotator>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ControllerCommand>(32);
        let (completed_tx, completed_rx) = mpsc::channel::<IterationCompleted>(8);
        let (rotation_tx, rotation_rx) = mpsc::unbounded_channel::<RotationEvent>();

        rotator.set_event_sender(Some(rotation_tx));

        let actor = SessionActor::new(fetch_client, rotator, snapshots, completed_tx);
        tokio::spawn(actor.run(cmd_rx, completed_rx, rotation_rx));
        debug!("Session controller actor spawned");

        SessionController { cmd_tx }
    }
}
