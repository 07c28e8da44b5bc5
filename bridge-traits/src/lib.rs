//! # Host Bridge Traits
//!
//! Capabilities the playback core needs from its host but does not
//! implement itself.
//!
//! ## Traits
//!
//! - [`Clock`](time::Clock) - Time source for session timestamps and deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Bridge implementations report failures as [`BridgeError`](error::BridgeError).
//! Platform implementations should convert platform-specific errors and keep
//! messages actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`: the core calls them from its
//! scheduling and completion threads as well as the controlling thread.

pub mod error;
pub mod time;

pub use error::BridgeError;

pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
