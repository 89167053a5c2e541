//! Desk Session - bounded open-tab registry
//!
//! A [`SessionManager`] keeps the set of open resource views ("tabs"):
//! - At most one tab per resource; reopening touches and focuses it
//! - Per-class capacity from a [`CapacityPolicy`](desk_core::CapacityPolicy),
//!   recomputed on every open from live [`CapacityInputs`]
//! - A global limit on heavy tabs, enforced by strict LRU eviction
//! - Cleanup callbacks from the [`CleanupRegistry`] run at most once, before
//!   the tab is removed
//! - Open/close requests are serialized; overlapping requests get
//!   [`SessionError::Busy`]
//!
//! Remote tab records go through a [`TabStore`]. Failures never roll back
//! local state; they are parked until [`SessionManager::reconcile`].

#![warn(unreachable_pub)]

pub mod capacity;
pub mod cleanup;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod store;
pub mod tab;

pub use capacity::{capacity_for, CapacityInputs, LiveCounts};
pub use cleanup::{CleanupRegistry, ReleaseFn};
pub use error::{PersistOp, SessionError};
pub use ledger::{PendingSync, ReconcileReport, SyncLedger};
pub use manager::{
    CloseOptions, CloseOutcome, CloseReport, OpenOutcome, OpenReport, SessionManager,
};
pub use store::{MemoryTabStore, TabStore};
pub use tab::{OpenRequest, Tab};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring a tab session
    pub use crate::{
        CloseOptions, CloseOutcome, MemoryTabStore, OpenOutcome, OpenRequest, SessionError,
        SessionManager, Tab, TabStore,
    };
    pub use desk_core::{CapacityPolicy, ResourceClass, ResourceId, SessionConfig};
}
