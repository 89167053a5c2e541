//! Sync status state machine
//!
//! ```text
//! Idle --edit--> Pending --fire, unchanged--> Idle
//! Pending --fire, changed--> Syncing
//! Syncing --ok--> Saved --decay--> Idle
//! Syncing --err--> Failed --decay--> Idle
//! Saved/Failed --edit--> Pending
//! Idle/Failed --flush--> Syncing
//! ```

use crate::error::AutosaveError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-draft save status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Nothing outstanding
    #[default]
    Idle,
    /// An edit is waiting for the debounce delay
    Pending,
    /// A commit is in flight
    Syncing,
    /// Last commit succeeded (transient)
    Saved,
    /// Last commit failed (transient)
    Failed,
}

impl SyncStatus {
    /// `Saved` and `Failed` decay back to `Idle`
    #[inline]
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Saved | Self::Failed)
    }

    /// Whether an edit moves this status to `Pending`
    #[inline]
    #[must_use]
    pub fn accepts_edit(self) -> bool {
        matches!(self, Self::Idle | Self::Saved | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Saved => "saved",
            Self::Failed => "failed",
        })
    }
}

/// Validate a status transition.
///
/// Illegal transitions return an error; with the `strict-debug` feature
/// they panic instead.
///
/// # Errors
/// `AutosaveError::IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: SyncStatus, to: SyncStatus) -> Result<(), AutosaveError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal sync status transition attempted: {from:?} -> {to:?}");

        #[cfg(not(feature = "strict-debug"))]
        Err(AutosaveError::IllegalTransition { from, to })
    }
}

/// Statuses reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: SyncStatus) -> Vec<SyncStatus> {
    use SyncStatus::{Failed, Idle, Pending, Saved, Syncing};
    match from {
        Idle => vec![Pending, Syncing],
        Pending => vec![Idle, Syncing],
        Syncing => vec![Saved, Failed],
        Saved => vec![Idle, Pending],
        Failed => vec![Idle, Pending, Syncing],
    }
}

fn allowed(from: SyncStatus, to: SyncStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn edit_paths() {
        assert!(validate_transition(SyncStatus::Idle, SyncStatus::Pending).is_ok());
        assert!(validate_transition(SyncStatus::Saved, SyncStatus::Pending).is_ok());
        assert!(validate_transition(SyncStatus::Failed, SyncStatus::Pending).is_ok());
    }

    #[test]
    fn commit_outcomes_only_from_syncing() {
        assert!(validate_transition(SyncStatus::Syncing, SyncStatus::Saved).is_ok());
        assert!(validate_transition(SyncStatus::Syncing, SyncStatus::Failed).is_ok());
        assert!(validate_transition(SyncStatus::Pending, SyncStatus::Saved).is_err());
        assert!(validate_transition(SyncStatus::Idle, SyncStatus::Failed).is_err());
    }

    #[test]
    fn syncing_cannot_be_interrupted() {
        assert!(validate_transition(SyncStatus::Syncing, SyncStatus::Idle).is_err());
        assert!(validate_transition(SyncStatus::Syncing, SyncStatus::Pending).is_err());
    }

    fn any_status() -> impl Strategy<Value = SyncStatus> {
        prop_oneof![
            Just(SyncStatus::Idle),
            Just(SyncStatus::Pending),
            Just(SyncStatus::Syncing),
            Just(SyncStatus::Saved),
            Just(SyncStatus::Failed),
        ]
    }

    proptest! {
        #[test]
        fn prop_validation_matches_table(from in any_status(), to in any_status()) {
            let allowed = allowed_transitions(from);
            prop_assert_eq!(validate_transition(from, to).is_ok(), allowed.contains(&to));
        }

        #[test]
        fn prop_no_self_loops(status in any_status()) {
            prop_assert!(validate_transition(status, status).is_err());
        }
    }
}
