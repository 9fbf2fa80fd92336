//! # Drono Common
//!
//! Shared error taxonomy and domain types for the drono traffic engine.
//!
//! This crate provides the foundational abstractions the other engine
//! crates build upon: the engine-wide error enum and the small set of
//! domain types that cross crate boundaries.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{EngineError, EngineResult};
pub use types::{FetchMode, RotationEvent, SessionEvent, SessionMode};
