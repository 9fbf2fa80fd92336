//! # Drono Snapshot
//!
//! Durable state persistence for the traffic engine.
//!
//! This crate provides:
//! - The minimal session and distribution snapshot projections
//! - The `SnapshotStore` capability trait
//! - A file-backed store (atomic JSON writes) and an in-memory store
//!
//! Snapshots exist so a session interrupted by a process restart can be
//! reconstructed and resumed by the operator. Restoration is conservative:
//! controllers always rebuild into a paused state regardless of the status
//! the snapshot recorded.

pub mod store;
pub mod types;

pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotConfig, SnapshotStore};
pub use types::{DistributionSnapshot, SessionSnapshot};
