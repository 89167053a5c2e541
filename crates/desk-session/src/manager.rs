//! Session manager for the bounded open-tab set
//!
//! Open and close requests are serialized by a reentrancy guard: a request
//! arriving while another is in flight is rejected with
//! [`SessionError::Busy`] and the tab set is left untouched. An eviction
//! runs the full close path (cleanup, removal, remote record) before the
//! evicting open inserts its tab.
//!
//! Local state is the source of truth for the running session. Remote
//! record failures are surfaced, parked in the sync ledger and replayed
//! only by an explicit [`SessionManager::reconcile`].

use crate::capacity::{capacity_for, CapacityInputs, LiveCounts};
use crate::cleanup::CleanupRegistry;
use crate::error::{PersistOp, SessionError};
use crate::ledger::{PendingSync, ReconcileReport, SyncLedger};
use crate::store::TabStore;
use crate::tab::{OpenRequest, Tab};
use chrono::{DateTime, Utc};
use desk_core::{
    Clock, NoticeLevel, ResourceClass, ResourceId, SessionConfig, SharedNotifier, SystemClock,
    TracingNotifier,
};
use indexmap::map::Entry;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A newly inserted tab and what it displaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenReport {
    /// The inserted tab
    pub tab: Tab,
    /// Tabs evicted to make room, in eviction order
    pub evicted: Vec<Tab>,
    /// Outcome of recording the open remotely
    pub persistence: Result<(), SessionError>,
}

/// Result of [`SessionManager::open`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A new tab was inserted
    Opened(OpenReport),
    /// The resource already had a tab; it was touched and focused
    Reused(Tab),
    /// Nothing changed (`Busy` or `Unavailable`)
    Rejected(SessionError),
}

impl OpenOutcome {
    /// The tab now open for the resource, if any
    #[must_use]
    pub fn tab(&self) -> Option<&Tab> {
        match self {
            Self::Opened(report) => Some(&report.tab),
            Self::Reused(tab) => Some(tab),
            Self::Rejected(_) => None,
        }
    }

    /// Tabs evicted by this open
    #[must_use]
    pub fn evicted(&self) -> &[Tab] {
        match self {
            Self::Opened(report) => &report.evicted,
            Self::Reused(_) | Self::Rejected(_) => &[],
        }
    }

    /// Whether the request was refused
    #[inline]
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// A removed tab and the follow-up state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReport {
    /// The removed tab
    pub tab: Tab,
    /// Whether a registered cleanup callback ran
    pub cleanup_invoked: bool,
    /// Resource that should take focus, when the removed tab was active
    pub next_focus: Option<ResourceId>,
    /// Outcome of recording the close remotely
    pub persistence: Result<(), SessionError>,
}

/// Result of [`SessionManager::close`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The tab was removed
    Closed(CloseReport),
    /// No tab was open; any registered cleanup still ran
    NotOpen {
        /// Whether a registered cleanup callback ran
        cleanup_invoked: bool,
    },
    /// Another operation is in progress; nothing changed
    Rejected(SessionError),
}

impl CloseOutcome {
    /// The removed tab, if one was open
    #[must_use]
    pub fn closed_tab(&self) -> Option<&Tab> {
        match self {
            Self::Closed(report) => Some(&report.tab),
            Self::NotOpen { .. } | Self::Rejected(_) => None,
        }
    }

    /// Whether a cleanup callback ran
    #[must_use]
    pub fn cleanup_invoked(&self) -> bool {
        match self {
            Self::Closed(report) => report.cleanup_invoked,
            Self::NotOpen { cleanup_invoked } => *cleanup_invoked,
            Self::Rejected(_) => false,
        }
    }

    /// Whether the request was refused
    #[inline]
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Options for [`SessionManager::close`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseOptions {
    /// Suppress the "Tab closed" notification
    pub silent: bool,
    /// Resource to focus when no tab of the same class remains
    pub fallback: Option<ResourceId>,
}

impl CloseOptions {
    /// Create default options (notify, no fallback)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options for a silent close
    #[inline]
    #[must_use]
    pub fn silent() -> Self {
        Self {
            silent: true,
            fallback: None,
        }
    }

    /// With fallback focus target
    #[inline]
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<ResourceId>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }
}

/// Held for the duration of one open/close; released on drop, including
/// when the future is cancelled mid-flight
struct OpGuard<'a>(&'a AtomicBool);

impl<'a> OpGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Set of tabs an eviction chooses from
#[derive(Debug, Clone, Copy)]
enum Scope {
    Class(ResourceClass),
    Heavy,
}

impl Scope {
    fn includes(self, tab: &Tab) -> bool {
        match self {
            Self::Class(class) => tab.resource_class == class,
            Self::Heavy => tab.heavy,
        }
    }

    fn eviction_notice(self, tab: &Tab) -> String {
        match self {
            Self::Class(class) => format!(
                "Closing least recently used {class} tab: {}",
                tab.display_name
            ),
            Self::Heavy => format!(
                "Closing oldest heavy tab to manage memory: {}",
                tab.display_name
            ),
        }
    }
}

/// Bounded registry of open tabs
///
/// One instance per application session; share it by reference.
pub struct SessionManager {
    config: SessionConfig,
    store: Arc<dyn TabStore>,
    inputs: Arc<dyn CapacityInputs>,
    clock: Arc<dyn Clock>,
    notifier: SharedNotifier,
    cleanup: Arc<CleanupRegistry>,
    tabs: Mutex<IndexMap<ResourceId, Tab>>,
    in_progress: AtomicBool,
    ledger: SyncLedger,
}

impl SessionManager {
    /// Create an empty session backed by `store`
    ///
    /// Defaults: system clock, zeroed [`LiveCounts`], [`TracingNotifier`]
    /// and a fresh cleanup registry.
    #[must_use]
    pub fn new(config: SessionConfig, store: Arc<dyn TabStore>) -> Self {
        Self {
            config,
            store,
            inputs: Arc::new(LiveCounts::new()),
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            cleanup: Arc::new(CleanupRegistry::new()),
            tabs: Mutex::new(IndexMap::new()),
            in_progress: AtomicBool::new(false),
            ledger: SyncLedger::new(),
        }
    }

    /// With clock for access timestamps
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// With capacity inputs
    #[inline]
    #[must_use]
    pub fn with_inputs(mut self, inputs: Arc<dyn CapacityInputs>) -> Self {
        self.inputs = inputs;
        self
    }

    /// With notification sink
    #[inline]
    #[must_use]
    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// With a cleanup registry shared with resource owners
    #[inline]
    #[must_use]
    pub fn with_cleanup_registry(mut self, cleanup: Arc<CleanupRegistry>) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Open a resource as a tab, evicting LRU tabs when over capacity
    ///
    /// An already open resource is touched and focused instead, unless it
    /// is no longer available, which refuses it like a fresh open. A remote
    /// record failure leaves the tab open locally and is reported in
    /// [`OpenReport::persistence`].
    pub async fn open(&self, request: OpenRequest) -> OpenOutcome {
        let Some(_guard) = OpGuard::acquire(&self.in_progress) else {
            tracing::debug!(
                resource = %request.resource_id,
                "open rejected: operation in progress"
            );
            return OpenOutcome::Rejected(SessionError::Busy);
        };

        if !self
            .inputs
            .is_available(request.resource_class, &request.resource_id)
        {
            self.notifier.notify(
                NoticeLevel::Error,
                &format!(
                    "Cannot open {}: resource is not available",
                    request.resource_id
                ),
            );
            return OpenOutcome::Rejected(SessionError::Unavailable(request.resource_id));
        }

        if let Some(tab) = self.activate(&request.resource_id, self.clock.now()) {
            tracing::debug!(resource = %tab.resource_id, "tab reused");
            return OpenOutcome::Reused(tab);
        }

        // Room for one more: an open always succeeds, even when the
        // derived limit is zero
        let mut evicted = Vec::new();
        if let Some(limit) = self.class_limit(request.resource_class) {
            evicted.extend(
                self.make_room(Scope::Class(request.resource_class), limit.max(1) - 1)
                    .await,
            );
        }
        if request.heavy {
            evicted.extend(
                self.make_room(Scope::Heavy, self.config.heavy_limit.max(1) - 1)
                    .await,
            );
        }

        let tab = Tab::opened(&request, self.clock.now());
        {
            let mut tabs = self.tabs.lock();
            deactivate_class(&mut tabs, tab.resource_class);
            tabs.insert(tab.resource_id.clone(), tab.clone());
        }
        tracing::info!(
            resource = %tab.resource_id,
            class = %tab.resource_class,
            heavy = tab.heavy,
            evicted = evicted.len(),
            "tab opened"
        );

        let persistence = self.record_open(&tab).await;
        OpenOutcome::Opened(OpenReport {
            tab,
            evicted,
            persistence,
        })
    }

    /// Close the tab for a resource
    ///
    /// Any registered cleanup runs before the tab is removed, and runs even
    /// when no tab is open. Closing twice is harmless.
    pub async fn close(&self, resource_id: &ResourceId, options: CloseOptions) -> CloseOutcome {
        let Some(_guard) = OpGuard::acquire(&self.in_progress) else {
            tracing::debug!(resource = %resource_id, "close rejected: operation in progress");
            return CloseOutcome::Rejected(SessionError::Busy);
        };
        self.close_inner(resource_id, &options).await
    }

    /// Touch and focus an open tab
    ///
    /// # Errors
    /// `SessionError::NotOpen` when no tab exists for the resource
    pub fn focus(&self, resource_id: &ResourceId) -> Result<Tab, SessionError> {
        self.activate(resource_id, self.clock.now())
            .ok_or_else(|| SessionError::NotOpen(resource_id.clone()))
    }

    /// Load tabs recorded remotely into the session
    ///
    /// Duplicates collapse to the latest access; tabs already open locally
    /// win over remote records. The most recently accessed tab of each
    /// class without a focused tab becomes active. Capacity is not
    /// enforced here, see [`enforce_capacity`](Self::enforce_capacity).
    ///
    /// Returns the number of tabs added.
    ///
    /// # Errors
    /// - `SessionError::Busy` if another operation is in progress
    /// - `SessionError::Persistence` if the store cannot list tabs; the
    ///   session is unchanged
    pub async fn hydrate(&self) -> Result<usize, SessionError> {
        let Some(_guard) = OpGuard::acquire(&self.in_progress) else {
            return Err(SessionError::Busy);
        };

        let listed = match self.store.list_open_tabs().await {
            Ok(listed) => listed,
            Err(error) => {
                let err = SessionError::persistence(PersistOp::List, &error);
                tracing::warn!(error = %err, "failed to load open tabs");
                self.notifier
                    .notify(NoticeLevel::Error, "Failed to load open tabs");
                return Err(err);
            }
        };

        let mut latest: IndexMap<ResourceId, Tab> = IndexMap::with_capacity(listed.len());
        for tab in listed {
            match latest.entry(tab.resource_id.clone()) {
                Entry::Occupied(mut slot) => {
                    if tab.last_accessed > slot.get().last_accessed {
                        slot.insert(tab);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(tab);
                }
            }
        }
        let mut ordered: Vec<Tab> = latest.into_values().collect();
        ordered.sort_by_key(|tab| tab.last_accessed);

        let added = {
            let mut tabs = self.tabs.lock();
            let mut added = 0;
            for mut tab in ordered {
                if tabs.contains_key(&tab.resource_id) {
                    continue;
                }
                tab.is_active = false;
                tabs.insert(tab.resource_id.clone(), tab);
                added += 1;
            }
            for class in ResourceClass::ALL {
                if !tabs
                    .values()
                    .any(|tab| tab.resource_class == class && tab.is_active)
                {
                    if let Some(id) = most_recent_in(&tabs, class) {
                        set_active(&mut tabs, &id);
                    }
                }
            }
            added
        };

        tracing::info!(added, "session hydrated");
        Ok(added)
    }

    /// Evict LRU tabs from every class (and the heavy set) above its
    /// freshly computed limit
    ///
    /// Used after hydration or when capacity inputs contract. Unlike
    /// `open`, a limit of zero closes every tab of the class.
    ///
    /// # Errors
    /// `SessionError::Busy` if another operation is in progress
    pub async fn enforce_capacity(&self) -> Result<Vec<Tab>, SessionError> {
        let Some(_guard) = OpGuard::acquire(&self.in_progress) else {
            return Err(SessionError::Busy);
        };

        let mut evicted = Vec::new();
        for class in ResourceClass::ALL {
            if let Some(limit) = self.class_limit(class) {
                evicted.extend(self.make_room(Scope::Class(class), limit).await);
            }
        }
        evicted.extend(self.make_room(Scope::Heavy, self.config.heavy_limit).await);
        Ok(evicted)
    }

    /// Silently close every tab, running each cleanup
    ///
    /// Returns the number of tabs closed.
    ///
    /// # Errors
    /// `SessionError::Busy` if another operation is in progress
    pub async fn close_all(&self) -> Result<usize, SessionError> {
        let Some(_guard) = OpGuard::acquire(&self.in_progress) else {
            return Err(SessionError::Busy);
        };

        let ids: Vec<ResourceId> = self.tabs.lock().keys().cloned().collect();
        let mut closed = 0;
        for id in ids {
            if let CloseOutcome::Closed(_) = self.close_inner(&id, &CloseOptions::silent()).await {
                closed += 1;
            }
        }
        tracing::info!(closed, "session closed");
        Ok(closed)
    }

    /// Replay outstanding remote records against the store
    ///
    /// Pending opens are recorded with the tab's current local state.
    ///
    /// # Errors
    /// `SessionError::Busy` if another operation is in progress
    pub async fn reconcile(&self) -> Result<ReconcileReport, SessionError> {
        let Some(_guard) = OpGuard::acquire(&self.in_progress) else {
            return Err(SessionError::Busy);
        };

        let mut settled = 0;
        for (resource_id, pending) in self.ledger.snapshot() {
            let result = match pending {
                PendingSync::Open(parked) => {
                    let tab = self.get(&resource_id).unwrap_or(parked);
                    self.store.record_open(&tab).await
                }
                PendingSync::Close => self.store.record_close(&resource_id).await,
            };
            match result {
                Ok(()) => {
                    self.ledger.settle(&resource_id);
                    settled += 1;
                }
                Err(error) => {
                    let reason = format!("{error:#}");
                    tracing::warn!(resource = %resource_id, error = %reason, "reconcile failed");
                }
            }
        }

        let report = ReconcileReport {
            settled,
            remaining: self.ledger.len(),
        };
        tracing::info!(settled = report.settled, remaining = report.remaining, "reconciled");
        Ok(report)
    }

    /// Install the release callback for a resource
    ///
    /// Returns `true` if an earlier registration was replaced.
    pub fn register_cleanup<F>(&self, resource_id: ResourceId, release: F) -> bool
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.cleanup.register(resource_id, release)
    }

    /// Remove a release callback without invoking it
    pub fn unregister_cleanup(&self, resource_id: &ResourceId) -> bool {
        self.cleanup.unregister(resource_id)
    }

    /// Shared cleanup registry
    #[inline]
    #[must_use]
    pub fn cleanup_registry(&self) -> &Arc<CleanupRegistry> {
        &self.cleanup
    }

    /// Open tabs in insertion order
    #[must_use]
    pub fn tabs(&self) -> Vec<Tab> {
        self.tabs.lock().values().cloned().collect()
    }

    /// Tab for a resource
    #[must_use]
    pub fn get(&self, resource_id: &ResourceId) -> Option<Tab> {
        self.tabs.lock().get(resource_id).cloned()
    }

    /// Whether a tab is open for the resource
    #[must_use]
    pub fn contains(&self, resource_id: &ResourceId) -> bool {
        self.tabs.lock().contains_key(resource_id)
    }

    /// Number of open tabs
    #[must_use]
    pub fn len(&self) -> usize {
        self.tabs.lock().len()
    }

    /// Whether no tab is open
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tabs.lock().is_empty()
    }

    /// Number of open tabs of a class
    #[must_use]
    pub fn count_class(&self, class: ResourceClass) -> usize {
        self.tabs
            .lock()
            .values()
            .filter(|tab| tab.resource_class == class)
            .count()
    }

    /// Number of open heavy tabs
    #[must_use]
    pub fn heavy_count(&self) -> usize {
        self.tabs.lock().values().filter(|tab| tab.heavy).count()
    }

    /// Focused tab of a class
    #[must_use]
    pub fn active(&self, class: ResourceClass) -> Option<Tab> {
        self.tabs
            .lock()
            .values()
            .find(|tab| tab.resource_class == class && tab.is_active)
            .cloned()
    }

    /// Whether an open/close is in flight
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Remote records not yet in sync with local state
    #[must_use]
    pub fn outstanding_sync(&self) -> Vec<(ResourceId, PendingSync)> {
        self.ledger.snapshot()
    }

    /// Session policy
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn class_limit(&self, class: ResourceClass) -> Option<usize> {
        capacity_for(self.config.policy(class), self.inputs.as_ref())
    }

    fn activate(&self, resource_id: &ResourceId, now: DateTime<Utc>) -> Option<Tab> {
        let mut tabs = self.tabs.lock();
        if !set_active(&mut tabs, resource_id) {
            return None;
        }
        let tab = tabs.get_mut(resource_id)?;
        tab.touch(now);
        Some(tab.clone())
    }

    fn lru_victim(&self, scope: Scope, keep: usize) -> Option<Tab> {
        let tabs = self.tabs.lock();
        let in_scope = tabs.values().filter(|tab| scope.includes(tab)).count();
        if in_scope <= keep {
            return None;
        }
        // min_by_key keeps the first minimum, i.e. the earliest inserted
        tabs.values()
            .filter(|tab| scope.includes(tab))
            .min_by_key(|tab| tab.last_accessed)
            .cloned()
    }

    async fn make_room(&self, scope: Scope, keep: usize) -> Vec<Tab> {
        let mut evicted = Vec::new();
        while let Some(victim) = self.lru_victim(scope, keep) {
            self.notifier
                .notify(NoticeLevel::Warning, &scope.eviction_notice(&victim));
            tracing::warn!(resource = %victim.resource_id, ?scope, "evicting tab");
            self.close_inner(&victim.resource_id, &CloseOptions::silent())
                .await;
            evicted.push(victim);
        }
        evicted
    }

    async fn close_inner(&self, resource_id: &ResourceId, options: &CloseOptions) -> CloseOutcome {
        let cleanup_invoked = self.cleanup.release(resource_id);

        let (tab, next_focus) = {
            let mut tabs = self.tabs.lock();
            let Some(tab) = tabs.shift_remove(resource_id) else {
                tracing::debug!(resource = %resource_id, cleanup_invoked, "close: no open tab");
                return CloseOutcome::NotOpen { cleanup_invoked };
            };
            let next_focus = if tab.is_active {
                most_recent_in(&tabs, tab.resource_class).or_else(|| options.fallback.clone())
            } else {
                None
            };
            if let Some(id) = &next_focus {
                set_active(&mut tabs, id);
            }
            (tab, next_focus)
        };

        let persistence = match self.store.record_close(resource_id).await {
            Ok(()) => {
                self.ledger.settle(resource_id);
                if !options.silent && self.config.notify_on_close {
                    self.notifier.notify(NoticeLevel::Info, "Tab closed");
                }
                Ok(())
            }
            Err(error) => {
                let err = SessionError::persistence(PersistOp::Close, &error);
                tracing::warn!(
                    resource = %resource_id,
                    error = %err,
                    "failed to record closed tab"
                );
                self.ledger.close_failed(resource_id.clone());
                self.notifier.notify(NoticeLevel::Error, "Failed to close tab");
                Err(err)
            }
        };

        tracing::info!(
            resource = %resource_id,
            cleanup_invoked,
            next_focus = next_focus.as_ref().map(ResourceId::as_str),
            "tab closed"
        );
        CloseOutcome::Closed(CloseReport {
            tab,
            cleanup_invoked,
            next_focus,
            persistence,
        })
    }

    async fn record_open(&self, tab: &Tab) -> Result<(), SessionError> {
        match self.store.record_open(tab).await {
            Ok(()) => {
                self.ledger.settle(&tab.resource_id);
                Ok(())
            }
            Err(error) => {
                let err = SessionError::persistence(PersistOp::Open, &error);
                tracing::warn!(
                    resource = %tab.resource_id,
                    error = %err,
                    "failed to record open tab"
                );
                self.ledger.open_failed(tab.clone());
                self.notifier.notify(NoticeLevel::Error, "Failed to open tab");
                Err(err)
            }
        }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("tabs", &self.tabs.lock().len())
            .field("in_progress", &self.is_busy())
            .field("cleanup", &self.cleanup)
            .field("outstanding_sync", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

fn deactivate_class(tabs: &mut IndexMap<ResourceId, Tab>, class: ResourceClass) {
    for tab in tabs.values_mut().filter(|tab| tab.resource_class == class) {
        tab.is_active = false;
    }
}

/// Mark a tab active and the rest of its class inactive
fn set_active(tabs: &mut IndexMap<ResourceId, Tab>, resource_id: &ResourceId) -> bool {
    let Some(class) = tabs.get(resource_id).map(|tab| tab.resource_class) else {
        return false;
    };
    deactivate_class(tabs, class);
    if let Some(tab) = tabs.get_mut(resource_id) {
        tab.is_active = true;
    }
    true
}

fn most_recent_in(tabs: &IndexMap<ResourceId, Tab>, class: ResourceClass) -> Option<ResourceId> {
    tabs.values()
        .filter(|tab| tab.resource_class == class)
        .max_by_key(|tab| tab.last_accessed)
        .map(|tab| tab.resource_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTabStore;
    use async_trait::async_trait;
    use desk_core::{CapacityPolicy, ManualClock};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    type Seen = Arc<Mutex<Vec<(NoticeLevel, String)>>>;

    fn harness(config: SessionConfig) -> (SessionManager, ManualClock, Arc<MemoryTabStore>, Seen) {
        let clock = ManualClock::at_epoch();
        let store = Arc::new(MemoryTabStore::new());
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let manager = SessionManager::new(config, store.clone())
            .with_clock(Arc::new(clock.clone()))
            .with_notifier(Arc::new(move |level: NoticeLevel, msg: &str| {
                sink.lock().push((level, msg.to_string()));
            }));
        (manager, clock, store, seen)
    }

    fn doc(id: &str) -> OpenRequest {
        OpenRequest::new(ResourceClass::Document, id, id.to_uppercase())
    }

    #[tokio::test]
    async fn reopen_reuses_tab() {
        let (manager, clock, store, _) = harness(SessionConfig::new());

        manager.open(doc("d1")).await;
        clock.advance(Duration::from_millis(50));
        let outcome = manager.open(doc("d1")).await;

        let OpenOutcome::Reused(tab) = outcome else {
            panic!("expected reuse, got {outcome:?}");
        };
        assert_eq!(tab.last_accessed.timestamp_millis(), 50);
        assert_eq!(manager.len(), 1);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn class_limit_evicts_least_recent() {
        let config = SessionConfig::new()
            .with_policy(ResourceClass::Document, CapacityPolicy::Fixed { limit: 2 });
        let (manager, clock, _, seen) = harness(config);

        for id in ["d1", "d2"] {
            manager.open(doc(id)).await;
            clock.advance(Duration::from_millis(100));
        }
        manager.focus(&ResourceId::new("d1")).unwrap();
        clock.advance(Duration::from_millis(100));

        let outcome = manager.open(doc("d3")).await;

        assert_eq!(outcome.evicted().len(), 1);
        assert_eq!(outcome.evicted()[0].resource_id.as_str(), "d2");
        assert!(manager.contains(&ResourceId::new("d1")));
        assert!(seen.lock().contains(&(
            NoticeLevel::Warning,
            "Closing least recently used document tab: D2".to_string()
        )));
        // evicted close is silent
        assert!(!seen.lock().iter().any(|(_, m)| m == "Tab closed"));
    }

    #[tokio::test]
    async fn one_active_tab_per_class() {
        let (manager, clock, _, _) = harness(SessionConfig::new().without_policies());

        manager.open(doc("d1")).await;
        clock.advance(Duration::from_millis(10));
        manager
            .open(OpenRequest::new(ResourceClass::Project, "p1", "P1"))
            .await;
        clock.advance(Duration::from_millis(10));
        manager.open(doc("d2")).await;

        assert_eq!(manager.active(ResourceClass::Document).unwrap().resource_id.as_str(), "d2");
        assert_eq!(manager.active(ResourceClass::Project).unwrap().resource_id.as_str(), "p1");

        manager.focus(&ResourceId::new("d1")).unwrap();
        let active: Vec<_> = manager
            .tabs()
            .into_iter()
            .filter(|t| t.resource_class == ResourceClass::Document && t.is_active)
            .map(|t| t.resource_id)
            .collect();
        assert_eq!(active, vec![ResourceId::new("d1")]);
    }

    #[tokio::test]
    async fn closing_active_tab_moves_focus() {
        let (manager, clock, _, seen) = harness(SessionConfig::new().without_policies());

        for id in ["d1", "d2", "d3"] {
            manager.open(doc(id)).await;
            clock.advance(Duration::from_millis(10));
        }
        manager.focus(&ResourceId::new("d1")).unwrap();

        let outcome = manager
            .close(&ResourceId::new("d1"), CloseOptions::new())
            .await;
        let CloseOutcome::Closed(report) = outcome else {
            panic!("expected close");
        };
        assert_eq!(report.next_focus, Some(ResourceId::new("d3")));
        assert!(manager.get(&ResourceId::new("d3")).unwrap().is_active);
        assert_eq!(seen.lock().last().unwrap().1, "Tab closed");
    }

    #[tokio::test]
    async fn closing_last_tab_uses_fallback() {
        let (manager, _, _, _) = harness(SessionConfig::new().without_policies());
        manager.open(doc("d1")).await;

        let outcome = manager
            .close(
                &ResourceId::new("d1"),
                CloseOptions::silent().with_fallback("home"),
            )
            .await;

        let CloseOutcome::Closed(report) = outcome else {
            panic!("expected close");
        };
        assert_eq!(report.next_focus, Some(ResourceId::new("home")));
    }

    #[tokio::test]
    async fn close_unknown_resource_is_not_an_error() {
        let (manager, _, _, seen) = harness(SessionConfig::new());

        let outcome = manager
            .close(&ResourceId::new("ghost"), CloseOptions::new())
            .await;

        assert_eq!(outcome, CloseOutcome::NotOpen { cleanup_invoked: false });
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn unavailable_resource_is_refused() {
        let inputs = Arc::new(LiveCounts::new());
        inputs.mark_unavailable(ResourceId::new("archived"));
        let (manager, _, _, seen) = harness(SessionConfig::new().without_policies());
        let manager = manager.with_inputs(inputs);

        let outcome = manager.open(doc("archived")).await;

        assert_eq!(
            outcome,
            OpenOutcome::Rejected(SessionError::Unavailable(ResourceId::new("archived")))
        );
        assert!(manager.is_empty());
        assert_eq!(
            seen.lock()[0],
            (
                NoticeLevel::Error,
                "Cannot open archived: resource is not available".to_string()
            )
        );
    }

    #[tokio::test]
    async fn focus_unknown_is_not_open() {
        let (manager, _, _, _) = harness(SessionConfig::new());
        assert_eq!(
            manager.focus(&ResourceId::new("x")),
            Err(SessionError::NotOpen(ResourceId::new("x")))
        );
    }

    /// Store whose `record_open` takes `delay` to settle
    struct SlowStore {
        inner: MemoryTabStore,
        delay: Duration,
    }

    #[async_trait]
    impl TabStore for SlowStore {
        async fn record_open(&self, tab: &Tab) -> anyhow::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.record_open(tab).await
        }

        async fn record_close(&self, resource_id: &ResourceId) -> anyhow::Result<()> {
            self.inner.record_close(resource_id).await
        }

        async fn list_open_tabs(&self) -> anyhow::Result<Vec<Tab>> {
            self.inner.list_open_tabs().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_request_is_rejected() {
        let store = Arc::new(SlowStore {
            inner: MemoryTabStore::new(),
            delay: Duration::from_millis(500),
        });
        let manager = Arc::new(SessionManager::new(SessionConfig::new().without_policies(), store));

        let first = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.open(doc("d1")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(manager.is_busy());

        assert_eq!(
            manager.open(doc("d2")).await,
            OpenOutcome::Rejected(SessionError::Busy)
        );
        assert!(manager
            .close(&ResourceId::new("d1"), CloseOptions::new())
            .await
            .is_rejected());

        let outcome = first.await.unwrap();
        assert!(matches!(outcome, OpenOutcome::Opened(_)));
        assert!(!manager.is_busy());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_open_releases_guard() {
        let store = Arc::new(SlowStore {
            inner: MemoryTabStore::new(),
            delay: Duration::from_millis(500),
        });
        let manager = SessionManager::new(SessionConfig::new().without_policies(), store);

        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), manager.open(doc("d1"))).await;

        assert!(timed_out.is_err());
        assert!(!manager.is_busy());
    }

    #[tokio::test]
    async fn hydrate_dedupes_and_focuses_latest() {
        let at = |ms| DateTime::<Utc>::from_timestamp_millis(ms).unwrap();
        let stale = Tab::opened(&doc("d1"), at(100));
        let d2 = Tab::opened(&doc("d2"), at(200));
        let fresh = Tab::opened(&doc("d1"), at(300));
        // MemoryTabStore keys by resource, so list through a raw vec store
        struct ListStore(Vec<Tab>);
        #[async_trait]
        impl TabStore for ListStore {
            async fn record_open(&self, _: &Tab) -> anyhow::Result<()> {
                Ok(())
            }
            async fn record_close(&self, _: &ResourceId) -> anyhow::Result<()> {
                Ok(())
            }
            async fn list_open_tabs(&self) -> anyhow::Result<Vec<Tab>> {
                Ok(self.0.clone())
            }
        }

        let manager = SessionManager::new(
            SessionConfig::new(),
            Arc::new(ListStore(vec![stale, d2, fresh])),
        );

        assert_eq!(manager.hydrate().await, Ok(2));
        let ids: Vec<_> = manager.tabs().into_iter().map(|t| t.resource_id).collect();
        assert_eq!(ids, vec![ResourceId::new("d2"), ResourceId::new("d1")]);
        let active = manager.active(ResourceClass::Document).unwrap();
        assert_eq!(active.resource_id.as_str(), "d1");
        assert_eq!(active.last_accessed, at(300));
    }
}
