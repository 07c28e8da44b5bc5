//! # Core Playback Traits
//!
//! The seams of the playback core and the format types shared across them.
//!
//! ## Architecture
//!
//! ```text
//! Player ──► Scheduler ──► AudioContext / Demuxer + Codec ──► OutputNode
//!    ▲                                                            │
//!    └──────────── completion events (control channel) ◄─────────┘
//! ```
//!
//! - [`AudioContext`]: an opened track resource (native file or generic
//!   demuxer) exposing duration, sample rate and format.
//! - [`Demuxer`] and [`Codec`]: the packet-level pipeline behind the generic
//!   decoder. The production implementation is Symphonia; tests substitute
//!   synthetic streams.
//! - [`OutputNode`]: accepts decoded buffers and reports their completion.
//! - [`Scheduler`]: keeps the output node fed for one backend.
//!
//! ## Threading Model
//!
//! Schedulers and output nodes are `Send + Sync`; completions arrive on a
//! dispatcher thread owned by the output node. Demuxers and codecs are only
//! `Send` and are always accessed behind the decoder lock.

use crate::decoder::Frame;
use crate::error::Result;
use crate::output::PcmBuffer;
use crate::scheduling::PlaybackSegment;
use crate::session::PlaybackSession;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Audio Format Types
// ============================================================================

/// Supported audio codecs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// MPEG-1 Audio Layer 3
    Mp3,
    /// Advanced Audio Coding (AAC/M4A)
    Aac,
    /// Free Lossless Audio Codec
    Flac,
    /// Ogg Vorbis
    Vorbis,
    /// Opus
    Opus,
    /// Waveform Audio File Format (linear PCM)
    Wav,
    /// Apple Lossless Audio Codec
    Alac,
    /// Codec not recognized
    Unknown,
    /// Custom or proprietary codec
    Other(String),
}

impl AudioCodec {
    /// Returns `true` if this is a lossless codec.
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioCodec::Flac | AudioCodec::Wav | AudioCodec::Alac)
    }

    /// Returns `true` if this codec is lossy.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            AudioCodec::Mp3 | AudioCodec::Aac | AudioCodec::Vorbis | AudioCodec::Opus
        )
    }
}

/// Sample representation produced by a codec before conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    U16,
    U24,
    U32,
    S8,
    S16,
    S24,
    S32,
    F32,
    F64,
}

impl SampleFormat {
    /// Returns `true` if samples of this format must be converted before
    /// reaching the output node, which consumes `f32`.
    pub fn needs_conversion(&self) -> bool {
        !matches!(self, SampleFormat::F32)
    }
}

/// Audio format of a track as seen by the output node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Source codec (before decoding)
    pub codec: AudioCodec,
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo, etc.)
    pub channels: u16,
    /// Bits per sample in the source format (e.g., 16, 24)
    pub bits_per_sample: Option<u16>,
}

impl AudioFormat {
    /// Create a new audio format descriptor.
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u16, bits_per_sample: Option<u16>) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// Standard CD quality (44.1 kHz, 16-bit stereo)
    pub fn cd_quality() -> Self {
        Self::new(AudioCodec::Wav, 44100, 2, Some(16))
    }

    /// Returns `true` if buffers of `other` can be played without
    /// reconnecting the output graph.
    pub fn same_layout(&self, other: &AudioFormat) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }
}

// ============================================================================
// Playback Context
// ============================================================================

/// An opened audio resource for one track.
///
/// `close` is idempotent and `open` after `close` re-acquires the resource.
/// Implementations also close themselves on drop.
pub trait AudioContext: Send + Sync {
    /// Acquire the file handle or demuxer. No-op if already open.
    fn open(&self) -> Result<()>;

    /// Release the file handle or demuxer. Safe to call repeatedly.
    fn close(&self);

    /// Returns `true` between `open` and `close`.
    fn is_open(&self) -> bool;

    /// Path of the underlying file.
    fn file(&self) -> &Path;

    /// Duration in seconds.
    fn duration(&self) -> f64;

    /// Frames per second.
    fn sample_rate(&self) -> u32;

    /// Total number of frames.
    fn frame_count(&self) -> u64;

    /// Format the output node must be connected with.
    fn audio_format(&self) -> &AudioFormat;
}

// ============================================================================
// Packet Pipeline
// ============================================================================

/// A compressed packet read from a container.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Presentation timestamp in time-base units.
    pub pts: i64,
    /// Duration in time-base units.
    pub duration: u64,
    /// Encoded payload.
    pub data: Bytes,
}

/// Reads packets of a single audio stream from a container.
pub trait Demuxer: Send {
    /// Seconds per timestamp tick.
    fn time_base(&self) -> f64;

    /// Stream duration in seconds.
    fn duration(&self) -> f64;

    /// Read the next packet of the audio stream.
    ///
    /// Returns [`PlaybackError::EndOfStream`](crate::PlaybackError::EndOfStream)
    /// once the stream is exhausted.
    fn read_packet(&mut self) -> Result<Packet>;

    /// Reposition at or before `time` (backward keyframe semantics).
    ///
    /// Returns [`PlaybackError::EndOfStream`](crate::PlaybackError::EndOfStream)
    /// if `time` is at or past the end of the stream.
    fn seek(&mut self, time: f64) -> Result<()>;

    /// Presentation time of `packet` in seconds.
    fn packet_time(&self, packet: &Packet) -> f64 {
        packet.pts as f64 * self.time_base()
    }
}

/// Decodes packets into frames of PCM samples.
pub trait Codec: Send {
    /// Output sample rate.
    fn sample_rate(&self) -> u32;

    /// Output channel count.
    fn channels(&self) -> u16;

    /// Decode one packet into zero or more frames.
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>>;

    /// Feed a packet through the codec without keeping its output, to prime
    /// codec state ahead of the first usable packet.
    fn decode_and_drop(&mut self, packet: &Packet) -> Result<()> {
        self.decode(packet).map(|_| ())
    }

    /// Return frames still buffered inside the codec at end of stream.
    fn drain(&mut self) -> Result<Vec<Frame>>;

    /// Discard codec-internal state, e.g. before a seek.
    fn flush(&mut self);
}

// ============================================================================
// Output Node
// ============================================================================

/// Continuation run when a scheduled buffer has finished playing (or was
/// flushed by `stop`). Receives the session the buffer was scheduled for.
pub type CompletionHandler = Box<dyn FnOnce(PlaybackSession) + Send + 'static>;

/// Sink for decoded audio.
///
/// Completion handlers are never invoked on the thread that scheduled the
/// buffer.
pub trait OutputNode: Send + Sync {
    /// Start or continue rendering scheduled audio.
    fn play(&self);

    /// Stop rendering, keeping scheduled buffers.
    fn pause(&self);

    /// Stop rendering and flush every scheduled buffer. Flushed buffers still
    /// report completion.
    fn stop(&self);

    /// `stop` plus clearing all position bookkeeping.
    fn reset(&self);

    /// Returns `true` while rendering.
    fn is_playing(&self) -> bool;

    /// Reconfigure the output graph for `format`.
    fn reconnect(&self, format: &AudioFormat);

    /// Queue a decoded buffer.
    ///
    /// With `immediate_playback`, `start_time` becomes the reference for
    /// position queries. Deferred buffers never touch position bookkeeping.
    fn schedule_buffer(
        &self,
        buffer: PcmBuffer,
        session: &PlaybackSession,
        completion: CompletionHandler,
        start_time: Option<f64>,
        immediate_playback: bool,
    );

    /// Queue a frame range of a natively readable file.
    fn schedule_segment(
        &self,
        segment: PlaybackSegment,
        completion: CompletionHandler,
        immediate_playback: bool,
    );

    /// Current playback position in seconds.
    ///
    /// Never negative or NaN; falls back to the last cached value when the
    /// render clock is unavailable.
    fn seek_position(&self) -> f64;

    /// Park the position at the end of the session's track without
    /// scheduling anything.
    fn seek_to_end_of_track(&self, session: &PlaybackSession);
}

// ============================================================================
// Scheduler
// ============================================================================

/// Keeps an output node fed with audio for one decoding backend.
///
/// Exactly one buffer is scheduled synchronously by each of `play_track`,
/// `play_loop`, `play_loop_from` and `seek_to_time` before they return; the
/// rest is scheduled on a serial background queue, driven by completions.
#[cfg_attr(test, mockall::automock)]
pub trait Scheduler: Send + Sync {
    /// Play the session's track from `start_position` seconds.
    fn play_track(&self, session: &PlaybackSession, start_position: f64);

    /// Play the session's complete loop from its start.
    fn play_loop(&self, session: &PlaybackSession, begin_playback: bool);

    /// Play the session's complete loop from `start_time`.
    fn play_loop_from(&self, session: &PlaybackSession, start_time: f64, begin_playback: bool);

    /// Restart scheduling at `seconds`. Delegates to loop playback when the
    /// session has a complete loop.
    fn seek_to_time(&self, session: &PlaybackSession, seconds: f64, begin_playback: bool);

    /// Leave loop playback and continue linearly from the current position.
    fn end_loop(&self, session: &PlaybackSession, loop_end_time: f64, begin_playback: bool);

    /// Start the next loop iteration after the previous one drained.
    fn loop_completed(&self, session: &PlaybackSession);

    /// Pause the output node.
    fn pause(&self);

    /// Resume the output node, or report completion if the track ended
    /// while paused.
    fn resume(&self);

    /// Cancel all scheduling, wait for queued work and stop the output node.
    fn stop(&self);
}
