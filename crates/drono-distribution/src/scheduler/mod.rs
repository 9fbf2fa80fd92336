//! Distribution Scheduler - actor-based long-horizon iteration driver
//!
//! Instead of firing iterations back to back, the scheduler precomputes a
//! timestamp for every iteration across an N-hour window following a
//! shape function, then triggers single iterations on the session
//! controller at those timestamps. In this mode the scheduler *is* the
//! timing source: each firing bypasses the controller's own delay step.
//!
//! State machine: `Unconfigured -> Configured -> Running <-> Paused ->
//! {Completed | Stopped}`.
//!
//! Entries whose time has already passed (e.g. after a restore) fire
//! immediately in catch-up order. Pausing records the pause instant;
//! resuming shifts all unfired entries forward by the pause duration so
//! the configured shape is preserved relative to resumption rather than
//! frozen wall-clock times.

mod actor;
mod commands;
mod handle;


pub use handle::DistributionScheduler;

use actor::SchedulerActor;
use commands::SchedulerCommand;
use drono_session::SessionController;
use drono_snapshot::SnapshotStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

impl DistributionScheduler {
    /// Create a distribution scheduler driving the given session
    /// controller, and spawn its actor.
    pub fn new(controller: SessionController, snapshots: Arc<dyn SnapshotStore>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<SchedulerCommand>(32);

        let actor = SchedulerActor::new(controller, snapshots);
        tokio::spawn(actor.run(cmd_rx));
        debug!("Distribution scheduler actor spawned");

        DistributionScheduler { cmd_tx }
    }
}
