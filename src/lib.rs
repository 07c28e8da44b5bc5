//! Workspace facade crate.
//!
//! Re-exports the playback core and its runtime services so host
//! applications can depend on `aural-workspace` alone and enable the
//! documented features (e.g., `device-cpal`) without wiring each crate
//! individually.

pub use core_playback as playback;
pub use core_runtime as runtime;
