//! Outstanding remote sync ledger
//!
//! When recording an open or close remotely fails, local state proceeds and
//! the intended remote change is parked here until an explicit
//! [`reconcile`](crate::SessionManager::reconcile) replays it. A later
//! successful operation for the same resource settles the entry.

use crate::tab::Tab;
use desk_core::ResourceId;
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Remote change that has not been recorded yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingSync {
    /// The tab is open locally but not recorded remotely
    Open(Tab),
    /// The tab is closed locally but still recorded remotely
    Close,
}

/// Result of a reconcile sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries replayed successfully
    pub settled: usize,
    /// Entries still outstanding
    pub remaining: usize,
}

/// Outstanding remote changes keyed by resource (latest intent wins)
#[derive(Debug, Default)]
pub struct SyncLedger {
    entries: Mutex<IndexMap<ResourceId, PendingSync>>,
}

impl SyncLedger {
    /// Create empty ledger
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a failed `recordOpen`
    pub fn open_failed(&self, tab: Tab) {
        self.entries
            .lock()
            .insert(tab.resource_id.clone(), PendingSync::Open(tab));
    }

    /// Park a failed `recordClose`
    pub fn close_failed(&self, resource_id: ResourceId) {
        self.entries.lock().insert(resource_id, PendingSync::Close);
    }

    /// Drop the entry for a resource after a successful remote call
    pub fn settle(&self, resource_id: &ResourceId) -> bool {
        self.entries.lock().shift_remove(resource_id).is_some()
    }

    /// Copy of outstanding entries, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ResourceId, PendingSync)> {
        self.entries
            .lock()
            .iter()
            .map(|(id, pending)| (id.clone(), pending.clone()))
            .collect()
    }

    /// Number of outstanding entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether local and remote state are believed to agree
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tab::OpenRequest;
    use chrono::{DateTime, Utc};
    use desk_core::ResourceClass;

    #[test]
    fn latest_intent_wins() {
        let ledger = SyncLedger::new();
        let tab = Tab::opened(
            &OpenRequest::new(ResourceClass::Document, "d1", "Doc"),
            DateTime::<Utc>::UNIX_EPOCH,
        );

        ledger.open_failed(tab.clone());
        ledger.close_failed(tab.resource_id.clone());

        assert_eq!(
            ledger.snapshot(),
            vec![(tab.resource_id.clone(), PendingSync::Close)]
        );
        assert!(ledger.settle(&tab.resource_id));
        assert!(ledger.is_empty());
    }
}
