//! Open tab records

use chrono::{DateTime, Utc};
use desk_core::{ResourceClass, ResourceId, TabId};
use serde::{Deserialize, Serialize};

/// One open, possibly expensive, resource view
///
/// At most one tab exists per `resource_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    /// Derived from the resource (`tab-{resourceId}`)
    pub id: TabId,
    /// Class used for capacity policy and focus grouping
    pub resource_class: ResourceClass,
    /// Resource shown by the tab
    pub resource_id: ResourceId,
    /// Label shown to the user
    pub display_name: String,
    /// Holds a scarce live resource (rendering context, ...)
    pub heavy: bool,
    /// Last open or focus
    pub last_accessed: DateTime<Utc>,
    /// Focused tab of its class
    pub is_active: bool,
}

impl Tab {
    /// Create an active tab for `request`, accessed at `now`
    #[must_use]
    pub fn opened(request: &OpenRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: TabId::for_resource(&request.resource_id),
            resource_class: request.resource_class,
            resource_id: request.resource_id.clone(),
            display_name: request.display_name.clone(),
            heavy: request.heavy,
            last_accessed: now,
            is_active: true,
        }
    }

    /// Record an access; never moves `last_accessed` backwards
    #[inline]
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed {
            self.last_accessed = now;
        }
    }
}

/// Request to open a resource as a tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Class of the resource
    pub resource_class: ResourceClass,
    /// Resource to open
    pub resource_id: ResourceId,
    /// Label shown to the user
    pub display_name: String,
    /// Whether the view holds a scarce live resource
    pub heavy: bool,
}

impl OpenRequest {
    /// Create a request for a light tab
    #[inline]
    #[must_use]
    pub fn new(
        resource_class: ResourceClass,
        resource_id: impl Into<ResourceId>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            resource_class,
            resource_id: resource_id.into(),
            display_name: display_name.into(),
            heavy: false,
        }
    }

    /// Mark the tab as holding a heavy resource
    #[inline]
    #[must_use]
    pub fn heavy(mut self) -> Self {
        self.heavy = true;
        self
    }

    /// Set heaviness explicitly (e.g. from the current view mode)
    #[inline]
    #[must_use]
    pub fn with_heavy(mut self, heavy: bool) -> Self {
        self.heavy = heavy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opened_tab_is_active_and_derives_id() {
        let request = OpenRequest::new(ResourceClass::Project, "p1", "Spiral").heavy();
        let tab = Tab::opened(&request, DateTime::<Utc>::UNIX_EPOCH);

        assert_eq!(tab.id.as_str(), "tab-p1");
        assert!(tab.is_active);
        assert!(tab.heavy);
    }

    #[test]
    fn touch_is_monotonic() {
        let request = OpenRequest::new(ResourceClass::Document, "d1", "Doc");
        let later = DateTime::<Utc>::from_timestamp_millis(5_000).unwrap();
        let mut tab = Tab::opened(&request, later);

        tab.touch(DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(tab.last_accessed, later);

        let latest = DateTime::<Utc>::from_timestamp_millis(9_000).unwrap();
        tab.touch(latest);
        assert_eq!(tab.last_accessed, latest);
    }

    #[test]
    fn serializes_with_remote_field_names() {
        let request = OpenRequest::new(ResourceClass::Project, "p1", "Spiral");
        let tab = Tab::opened(&request, DateTime::<Utc>::UNIX_EPOCH);
        let json = serde_json::to_value(&tab).unwrap();

        assert_eq!(json["resourceId"], "p1");
        assert_eq!(json["resourceClass"], "project");
        assert_eq!(json["isActive"], true);
        assert!(json.get("lastAccessed").is_some());
    }
}
