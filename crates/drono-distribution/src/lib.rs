//! # Drono Distribution
//!
//! The distribution scheduler: spreads a fixed number of iterations
//! across a wall-clock window following a configurable shape (uniform or
//! peak-weighted) and drives the session controller at the computed
//! timestamps. Shares the session controller's progress/pause/persistence
//! contract.

pub mod schedule;
pub mod scheduler;
pub mod types;

pub use schedule::{DistributionPattern, TrafficSchedule};
pub use scheduler::DistributionScheduler;
pub use types::{DistributionEvent, DistributionProgress, DistributionState};
