//! Open-tab persistence collaborator
//!
//! Keeps a remote record of open tabs for continuity across sessions. The
//! session manager treats it as write-behind: local state is authoritative
//! for the running session.

use crate::tab::Tab;
use async_trait::async_trait;
use desk_core::ResourceId;
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Remote record of open tabs
#[async_trait]
pub trait TabStore: Send + Sync {
    /// Record that `tab` is open (insert or replace)
    async fn record_open(&self, tab: &Tab) -> anyhow::Result<()>;

    /// Record that the tab for `resource_id` is closed
    async fn record_close(&self, resource_id: &ResourceId) -> anyhow::Result<()>;

    /// Tabs recorded as open, used to hydrate a new session
    async fn list_open_tabs(&self) -> anyhow::Result<Vec<Tab>>;
}

/// Tab store held in process memory
#[derive(Debug, Default)]
pub struct MemoryTabStore {
    tabs: Mutex<IndexMap<ResourceId, Tab>>,
}

impl MemoryTabStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store pre-populated with `tabs`, in order
    #[must_use]
    pub fn with_tabs(tabs: impl IntoIterator<Item = Tab>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.tabs.lock();
            for tab in tabs {
                guard.insert(tab.resource_id.clone(), tab);
            }
        }
        store
    }

    /// Copy of the recorded tabs
    #[must_use]
    pub fn snapshot(&self) -> Vec<Tab> {
        self.tabs.lock().values().cloned().collect()
    }

    /// Whether a tab is recorded for the resource
    #[must_use]
    pub fn contains(&self, resource_id: &ResourceId) -> bool {
        self.tabs.lock().contains_key(resource_id)
    }
}

#[async_trait]
impl TabStore for MemoryTabStore {
    async fn record_open(&self, tab: &Tab) -> anyhow::Result<()> {
        self.tabs
            .lock()
            .insert(tab.resource_id.clone(), tab.clone());
        Ok(())
    }

    async fn record_close(&self, resource_id: &ResourceId) -> anyhow::Result<()> {
        self.tabs.lock().shift_remove(resource_id);
        Ok(())
    }

    async fn list_open_tabs(&self) -> anyhow::Result<Vec<Tab>> {
        Ok(self.snapshot())
    }
}
