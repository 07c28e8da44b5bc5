//! # Core Runtime Module
//!
//! Ambient runtime infrastructure for the playback core:
//! - Logging and tracing infrastructure
//! - Runtime configuration
//! - Event bus system
//!
//! ## Overview
//!
//! The playback core runs on plain threads (a scheduling worker per backend
//! and a completion dispatcher per output node). Nothing here requires an
//! async runtime, but everything cooperates with one when the host has it.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
