//! Notification sink for user-facing outcomes
//!
//! The coordinators never render anything. They hand a level and a message
//! to a caller-supplied [`Notifier`], typically a toast queue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Severity of a user notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Neutral information ("Tab closed")
    Info,
    /// Positive outcome
    Success,
    /// Something the user should know about (eviction)
    Warning,
    /// A failed operation
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Caller-supplied sink for user notifications
pub trait Notifier: Send + Sync {
    /// Surface a message to the user
    fn notify(&self, level: NoticeLevel, message: &str);
}

impl<F> Notifier for F
where
    F: Fn(NoticeLevel, &str) + Send + Sync,
{
    fn notify(&self, level: NoticeLevel, message: &str) {
        self(level, message);
    }
}

/// Shared handle to a notifier
pub type SharedNotifier = Arc<dyn Notifier>;

/// Notifier that forwards to `tracing`
///
/// Used when no UI sink is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info | NoticeLevel::Success => {
                tracing::info!(target: "desk::notify", %level, "{message}");
            }
            NoticeLevel::Warning => tracing::warn!(target: "desk::notify", "{message}"),
            NoticeLevel::Error => tracing::error!(target: "desk::notify", "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn closure_notifier() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifier: SharedNotifier = Arc::new(move |level: NoticeLevel, msg: &str| {
            sink.lock().push((level, msg.to_string()));
        });

        notifier.notify(NoticeLevel::Warning, "evicted");

        assert_eq!(
            *seen.lock(),
            vec![(NoticeLevel::Warning, "evicted".to_string())]
        );
    }

    #[test]
    fn level_display() {
        assert_eq!(NoticeLevel::Success.to_string(), "success");
        assert_eq!(NoticeLevel::Error.to_string(), "error");
    }
}
