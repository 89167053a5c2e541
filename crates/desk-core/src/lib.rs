//! Desk Core - shared building blocks for session coordination
//!
//! Provides the pieces both coordinators are built from:
//! - Resource identifiers and resource classes
//! - Wall clocks (system and manually driven)
//! - A restartable, cancellable debounce timer
//! - The caller-supplied notification sink
//! - Configuration loaded from TOML
//!
//! # Example
//!
//! ```rust,ignore
//! use desk_core::{DebounceTimer, DeskConfig};
//!
//! let config = DeskConfig::from_toml_str("[autosave]\ndebounce_ms = 1500")?;
//! let timer = DebounceTimer::new();
//! timer.arm("draft", config.autosave.debounce(), |value| println!("fired with {value}"));
//! ```

#![warn(unreachable_pub)]

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod timer;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AutosaveConfig, CapacityPolicy, DeskConfig, SessionConfig};
pub use error::CoreError;
pub use notify::{NoticeLevel, Notifier, SharedNotifier, TracingNotifier};
pub use timer::DebounceTimer;
pub use types::{ResourceClass, ResourceId, TabId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
