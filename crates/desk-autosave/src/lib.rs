//! Desk Autosave - debounced, status-tracked saving of editable drafts
//!
//! An [`AutosaveCoordinator`] sits between an edit surface and the remote
//! setter for one entity:
//! - Every edit restarts a debounce delay (3s by default)
//! - When the delay elapses, the latest value is committed unless it equals
//!   the last saved value
//! - [`SyncStatus`] tracks `Idle -> Pending -> Syncing -> Saved/Failed -> Idle`
//! - Failures are reported through the notification sink and never retried
//!   automatically
//!
//! # Example
//!
//! ```rust,ignore
//! use desk_autosave::{commit_fn, AutosaveCoordinator};
//! use desk_core::{AutosaveConfig, TracingNotifier};
//! use std::sync::Arc;
//!
//! let target = commit_fn(|config: ModuleConfig| async move { actor.update_module(config).await });
//! let autosave = AutosaveCoordinator::open(
//!     "module",
//!     AutosaveConfig::default(),
//!     Arc::new(target),
//!     Arc::new(TracingNotifier),
//!     loaded_module,
//! );
//!
//! autosave.edit(edited_module);
//! // ...on navigation away
//! autosave.save_immediately().await?;
//! ```

#![warn(unreachable_pub)]

pub mod commit;
pub mod coordinator;
pub mod draft;
pub mod error;
pub mod status;

pub use commit::{commit_fn, CommitTarget, FnCommit};
pub use coordinator::AutosaveCoordinator;
pub use draft::EditableDraft;
pub use error::AutosaveError;
pub use status::{allowed_transitions, validate_transition, SyncStatus};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring an autosave surface
    pub use crate::{commit_fn, AutosaveCoordinator, AutosaveError, CommitTarget, SyncStatus};
    pub use desk_core::{AutosaveConfig, NoticeLevel, Notifier, SharedNotifier};
}
