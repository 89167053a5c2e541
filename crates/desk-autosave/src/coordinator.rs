//! Autosave coordinator
//!
//! Owns one entity's [`EditableDraft`], debounces edits, and drives the
//! [`SyncStatus`] state machine around a caller-supplied [`CommitTarget`].
//!
//! Guarantees:
//! - Edits inside the debounce window coalesce into one commit of the latest value
//! - A value deep-equal to the saved baseline is never committed
//! - At most one commit is in flight; edits made meanwhile are committed
//!   by a later cycle, never concurrently
//! - Commit errors stop here: they become `Failed` plus a notification

use crate::commit::CommitTarget;
use crate::draft::EditableDraft;
use crate::error::AutosaveError;
use crate::status::{validate_transition, SyncStatus};
use desk_core::{AutosaveConfig, DebounceTimer, NoticeLevel, SharedNotifier};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;

/// Debounced autosave for one editable entity
///
/// Cheap to clone; clones share the same draft.
pub struct AutosaveCoordinator<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Clone for AutosaveCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T: Send + 'static> {
    label: String,
    config: AutosaveConfig,
    target: Arc<dyn CommitTarget<T>>,
    notifier: SharedNotifier,
    state: Mutex<State<T>>,
    status_tx: watch::Sender<SyncStatus>,
    debounce: DebounceTimer<T>,
    /// Carries the edit count at scheduling time
    decay: DebounceTimer<u64>,
    /// Serializes commits for this draft
    commit_gate: tokio::sync::Mutex<()>,
}

struct State<T> {
    draft: Option<EditableDraft<T>>,
    status: SyncStatus,
    /// Number of non-priming edits so far
    edits: u64,
    /// Bumped by `rebase`; commits from an older epoch are ignored on settle
    epoch: u64,
    last_error: Option<AutosaveError>,
    commits: u64,
}

impl<T> AutosaveCoordinator<T>
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    /// Create a coordinator with no draft yet
    ///
    /// The first [`edit`](Self::edit) primes the baseline.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        config: AutosaveConfig,
        target: Arc<dyn CommitTarget<T>>,
        notifier: SharedNotifier,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                config,
                target,
                notifier,
                state: Mutex::new(State {
                    draft: None,
                    status: SyncStatus::Idle,
                    edits: 0,
                    epoch: 0,
                    last_error: None,
                    commits: 0,
                }),
                status_tx,
                debounce: DebounceTimer::new(),
                decay: DebounceTimer::new(),
                commit_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Create a coordinator already primed with `initial`
    #[must_use]
    pub fn open(
        label: impl Into<String>,
        config: AutosaveConfig,
        target: Arc<dyn CommitTarget<T>>,
        notifier: SharedNotifier,
        initial: T,
    ) -> Self {
        let coordinator = Self::new(label, config, target, notifier);
        coordinator.edit(initial);
        coordinator
    }

    /// Record a user edit
    ///
    /// The first call primes the baseline and schedules nothing. Every later
    /// call restarts the debounce delay with `value` and moves `Idle`,
    /// `Saved` or `Failed` to `Pending`. During `Syncing` the status is left
    /// alone; the value is committed by the next cycle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn edit(&self, value: T) {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        if state.draft.is_none() {
            state.draft = Some(EditableDraft::new(value));
            tracing::debug!(entity = %inner.label, "draft primed");
            return;
        }
        if let Some(draft) = state.draft.as_mut() {
            draft.set_current(value.clone());
        }
        state.edits += 1;
        inner.decay.cancel();
        if state.status.accepts_edit() {
            inner.transition(&mut state, SyncStatus::Pending);
        }

        let epoch = state.epoch;
        let weak = Arc::downgrade(inner);
        inner
            .debounce
            .arm(value, inner.config.debounce(), move |value| {
                if let Some(inner) = weak.upgrade() {
                    tokio::spawn(inner.on_debounce(value, epoch));
                }
            });
    }

    /// Cancel the pending delay and commit the current value now
    ///
    /// Intended for explicit navigation away. Waits for any in-flight commit
    /// to settle first. A clean draft is not committed.
    ///
    /// # Errors
    /// - `AutosaveError::NotPrimed` if no value was ever supplied
    /// - `AutosaveError::Commit` if the commit target rejected the value
    pub async fn save_immediately(&self) -> Result<SyncStatus, AutosaveError> {
        let inner = &self.inner;
        inner.debounce.cancel();
        let _gate = inner.commit_gate.lock().await;

        let (value, epoch, edits) = {
            let mut state = inner.state.lock();
            let Some(draft) = state.draft.as_ref() else {
                return Err(AutosaveError::NotPrimed);
            };
            if !draft.is_dirty() {
                if state.status == SyncStatus::Pending {
                    inner.transition(&mut state, SyncStatus::Idle);
                }
                return Ok(state.status);
            }
            let value = draft.current().clone();
            inner.decay.cancel();
            inner.transition(&mut state, SyncStatus::Syncing);
            state.commits += 1;
            (value, state.epoch, state.edits)
        };

        inner.run_commit(value, epoch, edits).await?;
        Ok(self.status())
    }

    /// Switch the editor to another entity
    ///
    /// Replaces both the edited and saved values with `value`, drops any
    /// pending edit without committing it, and resets the status to `Idle`.
    /// A commit still in flight for the previous entity settles without
    /// touching the new draft.
    pub fn rebase(&self, value: T) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        inner.debounce.cancel();
        inner.decay.cancel();
        state.epoch += 1;
        state.draft = Some(EditableDraft::new(value));
        state.last_error = None;
        if state.status != SyncStatus::Idle {
            tracing::debug!(entity = %inner.label, from = %state.status, "draft rebased");
            state.status = SyncStatus::Idle;
            inner.status_tx.send_replace(SyncStatus::Idle);
        }
    }

    /// Current status
    #[inline]
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.state.lock().status
    }

    /// Watch status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Latest edited value
    #[must_use]
    pub fn current(&self) -> Option<T> {
        self.inner
            .state
            .lock()
            .draft
            .as_ref()
            .map(|d| d.current().clone())
    }

    /// Last value confirmed saved
    #[must_use]
    pub fn committed(&self) -> Option<T> {
        self.inner
            .state
            .lock()
            .draft
            .as_ref()
            .map(|d| d.committed().clone())
    }

    /// Whether the latest edit is unsaved
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner
            .state
            .lock()
            .draft
            .as_ref()
            .is_some_and(EditableDraft::is_dirty)
    }

    /// Error from the most recent failed commit, cleared on success
    #[must_use]
    pub fn last_error(&self) -> Option<AutosaveError> {
        self.inner.state.lock().last_error.clone()
    }

    /// Number of commits issued so far
    #[must_use]
    pub fn commits_issued(&self) -> u64 {
        self.inner.state.lock().commits
    }

    /// Whether an edit is waiting for the debounce delay
    #[must_use]
    pub fn has_pending_edit(&self) -> bool {
        self.inner.debounce.is_armed()
    }

    /// Entity label used in messages
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }
}

impl<T> Inner<T>
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn transition(&self, state: &mut State<T>, to: SyncStatus) {
        if state.status == to {
            return;
        }
        match validate_transition(state.status, to) {
            Ok(()) => {
                tracing::debug!(entity = %self.label, from = %state.status, %to, "sync status");
                state.status = to;
                self.status_tx.send_replace(to);
            }
            Err(e) => tracing::warn!(entity = %self.label, "{e}"),
        }
    }

    async fn on_debounce(self: Arc<Self>, value: T, epoch: u64) {
        let _gate = self.commit_gate.lock().await;

        let edits = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return;
            }
            // A newer edit replaced this value while it waited for the gate;
            // its own timer or a manual flush commits it
            let stale = state.draft.as_ref().is_some_and(|d| *d.current() != value);
            if stale || self.debounce.is_armed() {
                tracing::debug!(entity = %self.label, "debounced value superseded");
                return;
            }
            let unchanged = state
                .draft
                .as_ref()
                .map_or(true, |d| !d.differs_from_committed(&value));
            if unchanged {
                tracing::debug!(entity = %self.label, "no change since last save");
                if state.status == SyncStatus::Pending {
                    self.transition(&mut state, SyncStatus::Idle);
                }
                return;
            }
            self.transition(&mut state, SyncStatus::Syncing);
            state.commits += 1;
            state.edits
        };

        // Failure is already recorded and notified
        let _ = self.run_commit(value, epoch, edits).await;
    }

    /// Invoke the commit target and settle the outcome
    ///
    /// Caller holds the commit gate and has moved the status to `Syncing`.
    async fn run_commit(
        self: &Arc<Self>,
        value: T,
        epoch: u64,
        edits_at_start: u64,
    ) -> Result<(), AutosaveError> {
        tracing::debug!(entity = %self.label, ?value, "committing");
        let result = self.target.commit(value.clone()).await;

        let failure = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                tracing::debug!(entity = %self.label, "commit settled after rebase; ignored");
                return result.map(|_| ()).map_err(|e| AutosaveError::commit(&e));
            }
            let superseded = state.edits != edits_at_start;

            let failure = match result {
                Ok(_) => {
                    if let Some(draft) = state.draft.as_mut() {
                        draft.mark_committed(value);
                    }
                    state.last_error = None;
                    self.transition(&mut state, SyncStatus::Saved);
                    tracing::info!(entity = %self.label, "saved");
                    None
                }
                Err(e) => {
                    let err = AutosaveError::commit(&e);
                    tracing::error!(entity = %self.label, error = %e, "save failed");
                    state.last_error = Some(err.clone());
                    self.transition(&mut state, SyncStatus::Failed);
                    Some((err, format!("{e:#}")))
                }
            };

            if superseded {
                // Newer edit is already waiting on the debounce timer
                self.transition(&mut state, SyncStatus::Pending);
            } else {
                let window = if failure.is_some() {
                    self.config.failed_display()
                } else {
                    self.config.saved_display()
                };
                self.schedule_decay(state.edits, window);
            }
            failure
        };

        match failure {
            Some((err, reason)) => {
                self.notifier.notify(
                    NoticeLevel::Error,
                    &format!("Failed to save {}: {reason}", self.label),
                );
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn schedule_decay(self: &Arc<Self>, edits: u64, window: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.decay.arm(edits, window, move |expected| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            if state.edits == expected && state.status.is_transient() {
                inner.transition(&mut state, SyncStatus::Idle);
            }
        });
    }
}

impl<T: Send + 'static> fmt::Debug for AutosaveCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("AutosaveCoordinator")
            .field("label", &self.inner.label)
            .field("status", &state.status)
            .field("edits", &state.edits)
            .field("commits", &state.commits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::commit_fn;
    use desk_core::TracingNotifier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator(calls: Arc<Mutex<Vec<String>>>, fail: bool) -> AutosaveCoordinator<String> {
        let target = commit_fn(move |value: String| {
            let calls = Arc::clone(&calls);
            async move {
                calls.lock().push(value.clone());
                if fail {
                    anyhow::bail!("rejected");
                }
                Ok(value)
            }
        });
        AutosaveCoordinator::new(
            "module",
            AutosaveConfig::default(),
            Arc::new(target),
            Arc::new(TracingNotifier),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn first_edit_primes_without_scheduling() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let auto = coordinator(Arc::clone(&calls), false);

        auto.edit("base".to_string());

        assert_eq!(auto.status(), SyncStatus::Idle);
        assert!(!auto.has_pending_edit());
        assert_eq!(auto.committed().as_deref(), Some("base"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn saved_decays_to_idle() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let auto = coordinator(Arc::clone(&calls), false);
        auto.edit("a".to_string());
        auto.edit("b".to_string());
        assert_eq!(auto.status(), SyncStatus::Pending);

        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(auto.status(), SyncStatus::Saved);
        assert_eq!(auto.committed().as_deref(), Some("b"));

        tokio::time::sleep(Duration::from_millis(2001)).await;
        assert_eq!(auto.status(), SyncStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_decays_after_longer_window() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let auto = coordinator(Arc::clone(&calls), true);
        auto.edit("a".to_string());
        auto.edit("b".to_string());

        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(auto.status(), SyncStatus::Failed);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(auto.status(), SyncStatus::Failed);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(auto.status(), SyncStatus::Idle);
        assert_eq!(calls.lock().len(), 1, "failed value is not retried");
    }

    #[tokio::test(start_paused = true)]
    async fn edit_interrupts_saved_display() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let auto = coordinator(Arc::clone(&calls), false);
        auto.edit("a".to_string());
        auto.edit("b".to_string());
        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(auto.status(), SyncStatus::Saved);

        auto.edit("c".to_string());
        assert_eq!(auto.status(), SyncStatus::Pending);

        // Old decay window would have ended here
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(auto.status(), SyncStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn rebase_discards_pending_edit() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let auto = coordinator(Arc::clone(&calls), false);
        auto.edit("module-a".to_string());
        auto.edit("module-a edited".to_string());

        auto.rebase("module-b".to_string());

        assert_eq!(auto.status(), SyncStatus::Idle);
        assert!(!auto.is_dirty());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(calls.lock().is_empty());
        assert_eq!(auto.current().as_deref(), Some("module-b"));
    }

    #[tokio::test(start_paused = true)]
    async fn save_immediately_requires_primed_draft() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let auto = coordinator(calls, false);
        assert_eq!(auto.save_immediately().await, Err(AutosaveError::NotPrimed));
    }

    #[tokio::test(start_paused = true)]
    async fn status_subscription_sees_transitions() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let auto = coordinator(calls, false);
        let mut rx = auto.subscribe();
        auto.edit("a".to_string());
        auto.edit("b".to_string());

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SyncStatus::Pending);

        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(*rx.borrow_and_update(), SyncStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_coordinator_never_commits() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let target = commit_fn(move |value: u32| {
            c.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value) }
        });
        let auto = AutosaveCoordinator::new(
            "quota",
            AutosaveConfig::default(),
            Arc::new(target),
            Arc::new(TracingNotifier),
        );
        auto.edit(1);
        auto.edit(2);
        drop(auto);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
