//! Error types for the drono traffic engine.

use thiserror::Error;

/// Result type alias for engine operations.
///
/// Convenience alias so we can write `EngineResult<T>` instead of
/// `Result<T, EngineError>` throughout the workspace.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Engine-wide error type.
///
/// Configuration and transition errors are returned synchronously to the
/// caller before any state change. In-loop failures (fetch, rotation) are
/// reported through the event channel and logs instead of being raised
/// across the async boundary, so a single failed iteration never aborts a
/// session.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Rejected configuration; nothing was started.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// The requested transition is not valid from the current state.
    /// The current state is unchanged.
    #[error("Invalid transition: {operation} not allowed in state {state}")]
    InvalidTransition { operation: String, state: String },

    /// Identity rotation did not produce a restored connection.
    /// Non-fatal by default: the iteration proceeds without a fresh identity.
    #[error("Identity rotation failed: {reason}")]
    RotationFailed { reason: String },

    /// A fetch attempt failed. The iteration still counts as consumed.
    #[error("Fetch failed: {reason}")]
    FetchFailed { reason: String },

    /// An exclusive operation was already in flight.
    #[error("Operation already in progress: {operation}")]
    AlreadyInProgress { operation: String },

    /// Snapshot persistence failed (save, load, or clear).
    #[error("Snapshot error: {reason}")]
    SnapshotFailed { reason: String },

    /// The controller's command or response channel closed; the actor is
    /// no longer reachable.
    #[error("Channel closed: {context}")]
    ChannelClosed { context: String },
}

impl EngineError {
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn invalid_transition(operation: impl Into<String>, state: impl Into<String>) -> Self {
        Self::InvalidTransition {
            operation: operation.into(),
            state: state.into(),
        }
    }

    pub fn rotation_failed(reason: impl Into<String>) -> Self {
        Self::RotationFailed {
            reason: reason.into(),
        }
    }

    pub fn fetch_failed(reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            reason: reason.into(),
        }
    }

    pub fn already_in_progress(operation: impl Into<String>) -> Self {
        Self::AlreadyInProgress {
            operation: operation.into(),
        }
    }

    pub fn snapshot_failed(reason: impl Into<String>) -> Self {
        Self::SnapshotFailed {
            reason: reason.into(),
        }
    }

    pub fn channel_closed(context: impl Into<String>) -> Self {
        Self::ChannelClosed {
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = EngineError::invalid_configuration("total iterations must be positive");
        assert!(matches!(err, EngineError::InvalidConfiguration { .. }));
        assert!(format!("{}", err).contains("total iterations"));

        let err = EngineError::invalid_transition("pause", "idle");
        assert_eq!(
            format!("{}", err),
            "Invalid transition: pause not allowed in state idle"
        );
    }

    #[test]
    fn test_error_pattern_matching() {
        let err = EngineError::already_in_progress("rotate");
        match err {
            EngineError::AlreadyInProgress { operation } => assert_eq!(operation, "rotate"),
            e => panic!("Wrong error type: {:?}", e),
        }
    }
}
