//! # Audio Decoder Module
//!
//! The generic-codec decoding backend.
//!
//! ## Architecture
//!
//! ```text
//! StreamOpener ──► Demuxer ──► Codec ──► Frame queue ──► FrameBuffer ──► PcmBuffer
//! ```
//!
//! 1. **[`StreamOpener`]**: probes a file and builds its demuxer and codec
//!    ([`SymphoniaOpener`] in production).
//! 2. **[`Demuxer`](crate::traits::Demuxer)**: reads packets, seeks to the
//!    keyframe at or before a target.
//! 3. **[`Codec`](crate::traits::Codec)**: turns packets into [`Frame`]s.
//! 4. **[`GenericDecoder`]**: accumulates frames into capped
//!    [`FrameBuffer`]s, corrects demuxer seek imprecision and tracks the
//!    end-of-file and end-of-loop conditions.
//!
//! ## Threading Model
//!
//! A decoder belongs to exactly one playback context and is only used under
//! that context's lock. The EOF and end-of-loop flags live in a shared
//! [`DecoderStatus`] so schedulers can poll them without the lock.

mod frame;
mod generic;

#[cfg(feature = "core-decoder")]
mod format_detector;

#[cfg(feature = "core-decoder")]
mod sample_converter;

#[cfg(feature = "core-decoder")]
mod symphonia;

pub use frame::{Frame, FrameBuffer};
pub(crate) use frame::{keep_last_samples_of_packet, stamp_frames};
pub use generic::{DecoderStatus, GenericDecoder};

#[cfg(feature = "core-decoder")]
pub use self::symphonia::{SymphoniaCodec, SymphoniaDemuxer, SymphoniaOpener};

#[cfg(feature = "core-decoder")]
pub use format_detector::FormatDetector;

#[cfg(feature = "core-decoder")]
pub use sample_converter::SampleConverter;

use crate::error::Result;
use crate::traits::{AudioFormat, Codec, Demuxer};

/// A freshly opened demuxer/codec pair with the stream's format.
pub struct OpenedStream {
    /// Packet reader positioned at the start of the stream.
    pub demuxer: Box<dyn Demuxer>,
    /// Codec for the selected audio stream.
    pub codec: Box<dyn Codec>,
    /// Format of the decoded output.
    pub format: AudioFormat,
    /// Total number of frames, zero if unknown.
    pub frame_count: u64,
}

/// Builds demuxer/codec pairs for one file. Called again to re-open a
/// closed context.
pub trait StreamOpener: Send + Sync {
    /// Open the stream from its beginning.
    fn open_stream(&self) -> Result<OpenedStream>;
}

#[cfg(not(feature = "core-decoder"))]
compile_error!(
    "Audio decoder feature is not enabled. Enable 'core-decoder' (on by default)"
);
