//! Error types for autosave

use crate::status::SyncStatus;

/// Autosave errors surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutosaveError {
    /// The commit operation rejected the value
    #[error("commit failed: {message}")]
    Commit {
        /// Underlying reason reported by the commit target
        message: String,
    },

    /// No value has been supplied yet, so there is nothing to save
    #[error("draft has not been primed with an initial value")]
    NotPrimed,

    /// Attempted status change outside the state machine
    #[error("illegal sync status transition: {from} -> {to}")]
    IllegalTransition {
        /// Current status
        from: SyncStatus,
        /// Requested status
        to: SyncStatus,
    },
}

impl AutosaveError {
    /// Build a commit failure from a collaborator error
    #[inline]
    #[must_use]
    pub fn commit(error: &anyhow::Error) -> Self {
        Self::Commit {
            message: format!("{error:#}"),
        }
    }

    /// Whether a later attempt with the same or a newer value may succeed
    ///
    /// The coordinator never retries on its own; this is for caller policy.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Commit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_error_keeps_context_chain() {
        let source = anyhow::anyhow!("name must not be empty").context("update module");
        let err = AutosaveError::commit(&source);
        assert_eq!(
            err.to_string(),
            "commit failed: update module: name must not be empty"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn transition_error_display() {
        let err = AutosaveError::IllegalTransition {
            from: SyncStatus::Syncing,
            to: SyncStatus::Idle,
        };
        assert_eq!(err.to_string(), "illegal sync status transition: syncing -> idle");
        assert!(!err.is_retryable());
    }
}
