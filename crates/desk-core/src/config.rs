//! Configuration for the autosave and session coordinators
//!
//! ```toml
//! [autosave]
//! debounce_ms = 3000
//!
//! [session]
//! heavy_limit = 3
//!
//! [session.policies.project]
//! kind = "derived"
//! related = "project"
//! max = 2
//! ```

use crate::error::CoreError;
use crate::types::ResourceClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// Autosave timing
    pub autosave: AutosaveConfig,
    /// Tab capacity and notification policy
    pub session: SessionConfig,
}

impl DeskConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate configuration from TOML
    ///
    /// # Errors
    /// - `CoreError::ConfigParse` for malformed TOML
    /// - `CoreError::InvalidConfig` for out-of-range values
    pub fn from_toml_str(text: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// With autosave section
    #[inline]
    #[must_use]
    pub fn with_autosave(mut self, autosave: AutosaveConfig) -> Self {
        self.autosave = autosave;
        self
    }

    /// With session section
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `CoreError::InvalidConfig` naming the offending field
    pub fn validate(&self) -> Result<(), CoreError> {
        self.autosave.validate()?;
        self.session.validate()
    }
}

/// Autosave timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before committing
    pub debounce_ms: u64,
    /// How long `Saved` stays visible before decaying to `Idle`
    pub saved_display_ms: u64,
    /// How long `Failed` stays visible before decaying to `Idle`
    pub failed_display_ms: u64,
}

impl AutosaveConfig {
    /// Create default timing (3s debounce, 2s saved, 3s failed)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With debounce delay
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce_ms = duration_ms(delay);
        self
    }

    /// With display windows for `Saved` and `Failed`
    #[inline]
    #[must_use]
    pub fn with_display(mut self, saved: Duration, failed: Duration) -> Self {
        self.saved_display_ms = duration_ms(saved);
        self.failed_display_ms = duration_ms(failed);
        self
    }

    /// Debounce delay
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// `Saved` display window
    #[inline]
    #[must_use]
    pub fn saved_display(&self) -> Duration {
        Duration::from_millis(self.saved_display_ms)
    }

    /// `Failed` display window
    #[inline]
    #[must_use]
    pub fn failed_display(&self) -> Duration {
        Duration::from_millis(self.failed_display_ms)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.debounce_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "autosave.debounce_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 3000,
            saved_display_ms: 2000,
            failed_display_ms: 3000,
        }
    }
}

/// Capacity limit for one resource class
///
/// Evaluated fresh on every open; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// No class-level limit
    Unbounded,
    /// At most `limit` tabs of the class
    Fixed {
        /// Maximum open tabs
        limit: usize,
    },
    /// At most `min(count of related, max)` tabs of the class
    Derived {
        /// Class whose live count bounds this one
        related: ResourceClass,
        /// Upper bound regardless of the live count
        max: usize,
    },
}

/// Tab capacity and notification policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Global limit on heavy tabs across all classes
    pub heavy_limit: usize,
    /// Per-class policies; classes without an entry are unbounded
    pub policies: BTreeMap<ResourceClass, CapacityPolicy>,
    /// Emit "Tab closed" on non-silent closes
    pub notify_on_close: bool,
}

impl SessionConfig {
    /// Create default policy (3 heavy tabs, projects bounded by live project count up to 2)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With global heavy-tab limit
    #[inline]
    #[must_use]
    pub fn with_heavy_limit(mut self, limit: usize) -> Self {
        self.heavy_limit = limit;
        self
    }

    /// With a policy for one class
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, class: ResourceClass, policy: CapacityPolicy) -> Self {
        self.policies.insert(class, policy);
        self
    }

    /// Without any class policies
    #[inline]
    #[must_use]
    pub fn without_policies(mut self) -> Self {
        self.policies.clear();
        self
    }

    /// Policy for a class (`Unbounded` when none is set)
    #[must_use]
    pub fn policy(&self, class: ResourceClass) -> &CapacityPolicy {
        const UNBOUNDED: &CapacityPolicy = &CapacityPolicy::Unbounded;
        self.policies.get(&class).unwrap_or(UNBOUNDED)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.heavy_limit == 0 {
            return Err(CoreError::InvalidConfig(
                "session.heavy_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(
            ResourceClass::Project,
            CapacityPolicy::Derived {
                related: ResourceClass::Project,
                max: 2,
            },
        );
        Self {
            heavy_limit: 3,
            policies,
            notify_on_close: true,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_dashboard_timings() {
        let config = DeskConfig::new();
        assert_eq!(config.autosave.debounce(), Duration::from_millis(3000));
        assert_eq!(config.autosave.saved_display(), Duration::from_millis(2000));
        assert_eq!(config.autosave.failed_display(), Duration::from_millis(3000));
        assert_eq!(config.session.heavy_limit, 3);
        assert_eq!(
            config.session.policy(ResourceClass::Project),
            &CapacityPolicy::Derived {
                related: ResourceClass::Project,
                max: 2
            }
        );
        assert_eq!(
            config.session.policy(ResourceClass::Document),
            &CapacityPolicy::Unbounded
        );
    }

    #[test]
    fn parse_partial_toml() {
        let text = r#"
            [autosave]
            debounce_ms = 1500

            [session]
            heavy_limit = 2

            [session.policies.document]
            kind = "fixed"
            limit = 4
        "#;

        let config = DeskConfig::from_toml_str(text).unwrap();

        assert_eq!(config.autosave.debounce_ms, 1500);
        assert_eq!(config.autosave.saved_display_ms, 2000);
        assert_eq!(config.session.heavy_limit, 2);
        assert_eq!(
            config.session.policy(ResourceClass::Document),
            &CapacityPolicy::Fixed { limit: 4 }
        );
        // Explicit policy table replaces the defaults
        assert_eq!(
            config.session.policy(ResourceClass::Project),
            &CapacityPolicy::Unbounded
        );
    }

    #[test]
    fn rejects_zero_debounce() {
        let err = DeskConfig::from_toml_str("[autosave]\ndebounce_ms = 0").unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_heavy_limit() {
        let config = DeskConfig::new().with_session(SessionConfig::new().with_heavy_limit(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = DeskConfig::from_toml_str("[autosave\n").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }

    #[test]
    fn toml_round_trip_preserves_policies() {
        let config = DeskConfig::new().with_session(
            SessionConfig::new()
                .with_policy(ResourceClass::Generic, CapacityPolicy::Fixed { limit: 1 }),
        );
        let text = toml::to_string(&config).unwrap();
        assert_eq!(DeskConfig::from_toml_str(&text).unwrap(), config);
    }
}
