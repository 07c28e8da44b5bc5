//! # Runtime Configuration Module
//!
//! Ambient settings shared by the playback core: logging, event bus sizing
//! and the clock sessions are timestamped with.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::RuntimeConfig;
//! use core_runtime::logging::{LogFormat, LoggingConfig};
//!
//! let config = RuntimeConfig::builder()
//!     .logging(LoggingConfig::default().with_format(LogFormat::Compact))
//!     .event_buffer_size(256)
//!     .build()
//!     .expect("valid configuration");
//!
//! assert_eq!(config.event_buffer_size, 256);
//! ```
//!
//! ## Error Handling
//!
//! The builder validates eagerly and reports actionable messages:
//!
//! ```should_panic
//! use core_runtime::config::RuntimeConfig;
//!
//! RuntimeConfig::builder()
//!     .event_buffer_size(0)
//!     .build()
//!     .expect("Should fail - an event bus needs capacity");
//! ```

use crate::error::{Error, Result};
use crate::events::{EventBus, DEFAULT_EVENT_BUFFER_SIZE};
use crate::logging::LoggingConfig;
use bridge_traits::time::{Clock, SystemClock};
use std::sync::Arc;

/// Upper bound for the event bus capacity.
pub const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

/// Ambient runtime configuration.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Logging setup, applied by [`init_logging`](crate::logging::init_logging).
    pub logging: LoggingConfig,

    /// Per-subscriber capacity of the event bus.
    pub event_buffer_size: usize,

    /// Time source for session timestamps.
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("logging", &self.logging)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("clock", &"<dyn Clock>")
            .finish()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            clock: Arc::new(SystemClock),
        }
    }
}

impl RuntimeConfig {
    /// Creates a new builder for constructing a `RuntimeConfig`.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size exceeds maximum of {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        if let Some(filter) = &self.logging.filter {
            if filter.trim().is_empty() {
                return Err(Error::Config(
                    "Log filter cannot be empty. Remove it to use the default filter.".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Creates an event bus sized by this configuration.
    pub fn event_bus(&self) -> EventBus {
        EventBus::new(self.event_buffer_size)
    }
}

/// Builder for [`RuntimeConfig`].
#[derive(Default)]
pub struct RuntimeConfigBuilder {
    logging: Option<LoggingConfig>,
    event_buffer_size: Option<usize>,
    clock: Option<Arc<dyn Clock>>,
}

impl RuntimeConfigBuilder {
    /// Sets the logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Sets the per-subscriber event bus capacity.
    ///
    /// Default: [`DEFAULT_EVENT_BUFFER_SIZE`]
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the clock sessions are timestamped with.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and validates the final `RuntimeConfig`.
    pub fn build(self) -> Result<RuntimeConfig> {
        let defaults = RuntimeConfig::default();
        let config = RuntimeConfig {
            logging: self.logging.unwrap_or(defaults.logging),
            event_buffer_size: self.event_buffer_size.unwrap_or(defaults.event_buffer_size),
            clock: self.clock.unwrap_or(defaults.clock),
        };

        config.validate()?;

        Ok(config)
    }
}
