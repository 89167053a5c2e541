//! Error types for the session manager

use desk_core::ResourceId;
use std::fmt;

/// Remote tab-record operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOp {
    /// `recordOpen`
    Open,
    /// `recordClose`
    Close,
    /// `listOpenTabs`
    List,
}

impl fmt::Display for PersistOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "record open",
            Self::Close => "record close",
            Self::List => "list open tabs",
        })
    }
}

/// Session manager errors
///
/// None of these are fatal: local tab state stays consistent in every case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The tab store call failed; local state proceeded regardless
    #[error("tab persistence failed ({op}): {message}")]
    Persistence {
        /// Which store call failed
        op: PersistOp,
        /// Underlying reason
        message: String,
    },

    /// The resource cannot be opened as a tab (e.g. archived)
    #[error("resource {0} is not available")]
    Unavailable(ResourceId),

    /// Another open/close is in progress; retry once it settles
    #[error("another tab operation is in progress")]
    Busy,

    /// No tab is open for the resource
    #[error("no open tab for resource {0}")]
    NotOpen(ResourceId),
}

impl SessionError {
    /// Build a persistence failure from a store error
    #[inline]
    #[must_use]
    pub fn persistence(op: PersistOp, error: &anyhow::Error) -> Self {
        Self::Persistence {
            op,
            message: format!("{error:#}"),
        }
    }

    /// Whether the caller may simply retry later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::Busy)
    }
}
