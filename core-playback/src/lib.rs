//! # Playback Core
//!
//! Gapless playback scheduling over two decoding backends.
//!
//! ## Overview
//!
//! This crate handles:
//! - Playback sessions and segment loops ([`session`])
//! - Opened audio resources per track, native or generic ([`context`])
//! - Demuxer/codec decoding with seek correction ([`decoder`], symphonia, feature-gated)
//! - Two-phase buffer scheduling with completion chaining ([`scheduling`])
//! - The pull-driven output node and an optional `cpal` device ([`output`])
//! - The transport state machine ([`Player`])
//!
//! ## Example
//!
//! ```no_run
//! use core_playback::{Player, PlayerNode, SchedulingConfig, Track};
//! use std::sync::Arc;
//!
//! # fn main() -> core_playback::Result<()> {
//! let config = SchedulingConfig::default();
//! let output = Arc::new(PlayerNode::new(&config)?);
//! let player = Player::new(output, &config)?;
//!
//! let track = Arc::new(Track::prepare("track-1", "Intro", "intro.flac", &config)?);
//! player.play(track, 0.0, None);
//! player.process_events();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod decoder;
pub mod error;
pub mod output;
pub mod player;
pub mod scheduling;
pub mod session;
pub mod time;
pub mod track;
pub mod traits;

pub use config::SchedulingConfig;
pub use context::{GenericPlaybackContext, NativePlaybackContext, PlaybackContext};
pub use error::{PlaybackError, Result};
pub use output::{PcmBuffer, PlayerNode};
pub use player::{PlaybackState, Player, SeekResult};
pub use scheduling::{GenericScheduler, NativeScheduler, SchedulerEvent};
pub use session::{PlaybackLoop, PlaybackSession, SessionRegistry};
pub use track::Track;
pub use traits::{AudioContext, AudioFormat, OutputNode, Scheduler};

#[cfg(feature = "device-cpal")]
pub use output::CpalDevice;
