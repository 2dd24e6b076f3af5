//! Error taxonomy for the engine's public surface.

use thiserror::Error;

use crate::remote::traits::RemoteError;

/// Errors surfaced through dispatch and its completion signal.
///
/// The variants mirror how much state was touched when the error arose:
/// `Validation` and `ConflictPending` are rejected before any optimistic
/// update, so nothing needs rolling back; `Transient` and `Fatal` are
/// reported after the rollback has already been applied, so the cache is in
/// its last-known-good state by the time the caller sees them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Rejected before any optimistic update was applied.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// A mutation is already in flight for the target node; the caller must
    /// wait for it to settle. Never queued.
    #[error("mutation already pending for node {node}")]
    ConflictPending { node: String },

    /// Network-level failure. Rollback applied; retry is the caller's call.
    #[error("transient backend failure: {0}")]
    Transient(RemoteError),

    /// Malformed server behavior or an internal invariant breach. Rollback
    /// applied; the forest is left in its last-known-good state.
    #[error("fatal: {reason}")]
    Fatal { reason: String },
}

impl EngineError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::ConflictPending { .. } => "conflict_pending",
            Self::Transient(_) => "transient",
            Self::Fatal { .. } => "fatal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = EngineError::validation("empty content");
        assert_eq!(format!("{err}"), "validation failed: empty content");

        let err = EngineError::Transient(RemoteError::Transport("timeout".into()));
        assert!(format!("{err}").contains("timeout"));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(EngineError::validation("x").kind(), "validation");
        assert_eq!(
            EngineError::ConflictPending { node: "n".into() }.kind(),
            "conflict_pending"
        );
        assert_eq!(
            EngineError::Transient(RemoteError::NotFound).kind(),
            "transient"
        );
        assert_eq!(EngineError::fatal("x").kind(), "fatal");
    }
}
