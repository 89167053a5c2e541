//! Cleanup registry
//!
//! Maps a resource ID to the callback that releases its live resource
//! (rendering context, subscription, ...). Owners register and unregister
//! their own callbacks; the session manager only invokes them, once, when
//! it closes or evicts the resource. The registry never owns the resource.

use dashmap::DashMap;
use desk_core::ResourceId;
use std::fmt;

/// Boxed release callback
pub type ReleaseFn = Box<dyn FnOnce() + Send + Sync + 'static>;

/// Table of resource ID to release callback
#[derive(Default)]
pub struct CleanupRegistry {
    callbacks: DashMap<ResourceId, ReleaseFn>,
}

impl CleanupRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the release callback for a resource
    ///
    /// Replaces (without invoking) any earlier registration; returns `true`
    /// if one was replaced.
    pub fn register<F>(&self, resource_id: ResourceId, release: F) -> bool
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        let replaced = self
            .callbacks
            .insert(resource_id.clone(), Box::new(release))
            .is_some();
        tracing::debug!(resource = %resource_id, replaced, "cleanup registered");
        replaced
    }

    /// Remove a registration without invoking it
    pub fn unregister(&self, resource_id: &ResourceId) -> bool {
        self.callbacks.remove(resource_id).is_some()
    }

    /// Remove and invoke the callback for a resource
    ///
    /// Returns `false` if nothing was registered, which is a valid state for
    /// light resources. The callback runs outside the table lock, so it may
    /// itself use the registry.
    pub fn release(&self, resource_id: &ResourceId) -> bool {
        let Some((_, release)) = self.callbacks.remove(resource_id) else {
            return false;
        };
        tracing::debug!(resource = %resource_id, "releasing resource");
        release();
        true
    }

    /// Whether a callback is registered for the resource
    #[inline]
    #[must_use]
    pub fn contains(&self, resource_id: &ResourceId) -> bool {
        self.callbacks.contains_key(resource_id)
    }

    /// Number of registrations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether the registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<ResourceId> = self.callbacks.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("CleanupRegistry")
            .field("resources", &ids)
            .finish()
    }
}
