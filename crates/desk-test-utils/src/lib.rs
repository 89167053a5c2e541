//! Testing utilities for the desk workspace
//!
//! Shared fixtures: a recording notifier, a scripted commit target, a tab
//! store that fails on demand, and a cleanup probe.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desk_autosave::CommitTarget;
use desk_core::{
    AutosaveConfig, ManualClock, NoticeLevel, Notifier, ResourceClass, ResourceId, SessionConfig,
};
use desk_session::{MemoryTabStore, OpenRequest, SessionManager, Tab, TabStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Notifier that keeps every message
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    entries: Mutex<Vec<(NoticeLevel, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<(NoticeLevel, String)> {
        self.entries.lock().clone()
    }

    pub fn count(&self, level: NoticeLevel) -> usize {
        self.entries.lock().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn contains(&self, level: NoticeLevel, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}

/// Commit target that records calls and fails when told to
#[derive(Debug)]
pub struct ScriptedCommit<T> {
    calls: Mutex<Vec<(Instant, T)>>,
    fail: AtomicBool,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> ScriptedCommit<T> {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    /// Each commit takes `latency` of (virtual) time to settle
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            latency,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    /// Make every following commit fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn values(&self) -> Vec<T> {
        self.calls.lock().iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> CommitTarget<T> for ScriptedCommit<T> {
    async fn commit(&self, value: T) -> anyhow::Result<T> {
        self.calls.lock().push((Instant::now(), value.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("backend rejected the update");
        }
        Ok(value)
    }
}

/// In-memory tab store whose calls can be made to fail
#[derive(Debug, Default)]
pub struct FlakyTabStore {
    inner: MemoryTabStore,
    fail_opens: AtomicBool,
    fail_closes: AtomicBool,
    fail_lists: AtomicBool,
    latency_ms: AtomicU64,
}

impl FlakyTabStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_tabs(tabs: impl IntoIterator<Item = Tab>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryTabStore::with_tabs(tabs),
            ..Self::default()
        })
    }

    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    pub fn fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Every call takes `latency` of (virtual) time
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    pub fn recorded(&self) -> Vec<Tab> {
        self.inner.snapshot()
    }

    pub fn is_recorded(&self, resource_id: &str) -> bool {
        self.inner.contains(&ResourceId::new(resource_id))
    }
}

#[async_trait]
impl TabStore for FlakyTabStore {
    async fn record_open(&self, tab: &Tab) -> anyhow::Result<()> {
        self.delay().await;
        if self.fail_opens.load(Ordering::SeqCst) {
            anyhow::bail!("tab actor unreachable");
        }
        self.inner.record_open(tab).await
    }

    async fn record_close(&self, resource_id: &ResourceId) -> anyhow::Result<()> {
        self.delay().await;
        if self.fail_closes.load(Ordering::SeqCst) {
            anyhow::bail!("tab actor unreachable");
        }
        self.inner.record_close(resource_id).await
    }

    async fn list_open_tabs(&self) -> anyhow::Result<Vec<Tab>> {
        self.delay().await;
        if self.fail_lists.load(Ordering::SeqCst) {
            anyhow::bail!("tab actor unreachable");
        }
        self.inner.list_open_tabs().await
    }
}

/// Counts cleanup invocations per resource and logs their order
#[derive(Debug, Default, Clone)]
pub struct CleanupProbe {
    counts: Arc<Mutex<HashMap<ResourceId, usize>>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl CleanupProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a counting cleanup for `resource_id` with the session
    pub fn register(&self, session: &SessionManager, resource_id: &str) {
        let id = ResourceId::new(resource_id);
        let counts = Arc::clone(&self.counts);
        let log = Arc::clone(&self.log);
        let key = id.clone();
        session.register_cleanup(id, move || {
            *counts.lock().entry(key.clone()).or_insert(0) += 1;
            log.lock().push(format!("cleanup:{key}"));
        });
    }

    pub fn count(&self, resource_id: &str) -> usize {
        self.counts
            .lock()
            .get(&ResourceId::new(resource_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

/// Session wired to a manual clock, a recording notifier and a flaky store
pub struct SessionFixture {
    pub session: SessionManager,
    pub clock: ManualClock,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<FlakyTabStore>,
}

impl SessionFixture {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_store(config, FlakyTabStore::new())
    }

    pub fn with_store(config: SessionConfig, store: Arc<FlakyTabStore>) -> Self {
        let clock = ManualClock::at_epoch();
        let notifier = RecordingNotifier::new();
        let session = SessionManager::new(config, store.clone())
            .with_clock(Arc::new(clock.clone()))
            .with_notifier(notifier.clone());
        Self {
            session,
            clock,
            notifier,
            store,
        }
    }

    /// Advance the tab clock
    pub fn tick(&self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
    }

    pub fn ids(&self) -> Vec<String> {
        self.session
            .tabs()
            .into_iter()
            .map(|t| t.resource_id.to_string())
            .collect()
    }
}

pub fn heavy(id: &str) -> OpenRequest {
    OpenRequest::new(ResourceClass::Generic, id, format!("Scene {id}")).heavy()
}

pub fn project(id: &str) -> OpenRequest {
    OpenRequest::new(ResourceClass::Project, id, format!("Project {id}"))
}

pub fn document(id: &str) -> OpenRequest {
    OpenRequest::new(ResourceClass::Document, id, format!("Doc {id}"))
}

pub fn at_ms(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap()
}

/// Autosave timing used by the dashboards (3s debounce, 2s/3s display)
pub fn dashboard_autosave() -> AutosaveConfig {
    AutosaveConfig::default()
}
