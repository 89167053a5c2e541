//! Restartable, cancellable debounce timer
//!
//! A [`DebounceTimer`] holds at most one armed delay. Arming again cancels
//! the previous delay, so for a given timer no two callbacks ever fire for
//! overlapping arms. Each arm fires at most once.
//!
//! Delays run on `tokio::time`, so tests drive them with the paused
//! runtime clock (`start_paused = true` plus `tokio::time::advance`).

use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Slot {
    /// Bumped on every arm and cancel; a sleeping task only fires if its
    /// generation is still current.
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Debounce timer carrying a value of type `T` to its callback
pub struct DebounceTimer<T> {
    slot: Arc<Mutex<Slot>>,
    _value: PhantomData<fn(T)>,
}

impl<T: Send + 'static> DebounceTimer<T> {
    /// Create a disarmed timer
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            _value: PhantomData,
        }
    }

    /// Arm the timer, cancelling any previously armed delay
    ///
    /// `on_fire` runs once with `value` after `delay`, unless the timer is
    /// cancelled or re-armed first. The callback is synchronous; it runs
    /// after the timer has disarmed itself, so it may re-arm the timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, value: T, delay: Duration, on_fire: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = shared.lock();
                if slot.generation != generation {
                    return;
                }
                slot.handle = None;
            }
            on_fire(value);
        });
        slot.handle = Some(handle);
        tracing::trace!(generation, delay_ms = delay.as_millis(), "timer armed");
    }

    /// Cancel the armed delay, if any
    ///
    /// Returns `true` if a delay was pending.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        slot.generation = slot.generation.wrapping_add(1);
        match slot.handle.take() {
            Some(handle) => {
                handle.abort();
                tracing::trace!("timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a delay is currently pending
    #[inline]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot.lock().handle.is_some()
    }
}

impl<T: Send + 'static> Default for DebounceTimer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DebounceTimer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("DebounceTimer")
            .field("generation", &slot.generation)
            .field("armed", &slot.handle.is_some())
            .finish()
    }
}

impl<T> Drop for DebounceTimer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.slot.lock().handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, Arc<AtomicUsize>) {
        (Arc::new(Mutex::new(Vec::new())), Arc::new(AtomicUsize::new(0)))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let timer = DebounceTimer::new();
        let (seen, count) = recorder();
        let (seen2, count2) = (Arc::clone(&seen), Arc::clone(&count));

        timer.arm("a", Duration::from_millis(3000), move |v| {
            seen2.lock().push(v);
            count2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec!["a"]);
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_pending_value() {
        let timer = DebounceTimer::new();
        let (seen, _) = recorder();

        let first = Arc::clone(&seen);
        timer.arm("a", Duration::from_millis(3000), move |v| first.lock().push(v));
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let second = Arc::clone(&seen);
        timer.arm("ab", Duration::from_millis(3000), move |v| second.lock().push(v));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(seen.lock().is_empty(), "first arm must not fire");

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*seen.lock(), vec!["ab"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let timer = DebounceTimer::new();
        let (_, count) = recorder();
        let c = Arc::clone(&count);

        timer.arm((), Duration::from_millis(100), move |()| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.cancel());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_aborts_pending_delay() {
        let (_, count) = recorder();
        {
            let timer = DebounceTimer::new();
            let c = Arc::clone(&count);
            timer.arm((), Duration::from_millis(100), move |()| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
