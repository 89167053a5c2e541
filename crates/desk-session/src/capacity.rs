//! Capacity policy evaluation
//!
//! Limits may depend on counts owned by another component (e.g. how many
//! projects are currently active). They are recomputed on every open.

use dashmap::{DashMap, DashSet};
use desk_core::{CapacityPolicy, ResourceClass, ResourceId};

/// Read-only view of the live inputs capacity limits are derived from
pub trait CapacityInputs: Send + Sync {
    /// Current number of live resources of `class`
    fn live_count(&self, class: ResourceClass) -> usize;

    /// Whether `resource_id` may be opened as a tab at all
    fn is_available(&self, _class: ResourceClass, _resource_id: &ResourceId) -> bool {
        true
    }
}

/// Evaluate a policy against the current inputs
///
/// Returns `None` when the class is unbounded.
#[must_use]
pub fn capacity_for(policy: &CapacityPolicy, inputs: &dyn CapacityInputs) -> Option<usize> {
    match policy {
        CapacityPolicy::Unbounded => None,
        CapacityPolicy::Fixed { limit } => Some(*limit),
        CapacityPolicy::Derived { related, max } => Some(inputs.live_count(*related).min(*max)),
    }
}

/// In-process capacity inputs, updated by whoever tracks the counts
#[derive(Debug, Default)]
pub struct LiveCounts {
    counts: DashMap<ResourceClass, usize>,
    unavailable: DashSet<ResourceId>,
}

impl LiveCounts {
    /// Create with all counts at zero
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the live count for a class
    pub fn set(&self, class: ResourceClass, count: usize) {
        self.counts.insert(class, count);
    }

    /// Mark a resource as not openable (archived, deleted)
    pub fn mark_unavailable(&self, resource_id: ResourceId) {
        self.unavailable.insert(resource_id);
    }

    /// Make a resource openable again
    pub fn mark_available(&self, resource_id: &ResourceId) {
        self.unavailable.remove(resource_id);
    }
}

impl CapacityInputs for LiveCounts {
    fn live_count(&self, class: ResourceClass) -> usize {
        self.counts.get(&class).map_or(0, |c| *c)
    }

    fn is_available(&self, _class: ResourceClass, resource_id: &ResourceId) -> bool {
        !self.unavailable.contains(resource_id)
    }
}
