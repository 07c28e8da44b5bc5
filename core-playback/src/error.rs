//! # Playback Error Types
//!
//! Error types for the playback core. Only initialization errors (opening a
//! context, probing a stream) are surfaced to callers; decode and scheduling
//! failures are logged at the scheduler boundary and never escape it.

use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Initialization Errors
    // ========================================================================
    /// The file cannot be opened by the native backend.
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The container holds no decodable audio stream.
    #[error("No audio stream found: {0}")]
    NoAudioStream(String),

    /// The audio stream is encrypted and cannot be decoded.
    #[error("Audio stream is DRM protected: {0}")]
    DrmProtected(String),

    /// The codec for the audio stream could not be initialized.
    #[error("Codec initialization failed: {0}")]
    CodecInit(String),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// Error occurred while decoding a packet.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Audio stream is corrupted or contains invalid data.
    #[error("Corrupted audio stream: {0}")]
    CorruptedStream(String),

    /// End of stream reached. Treated as a signal, not a failure.
    #[error("End of stream")]
    EndOfStream,

    // ========================================================================
    // Playback Control Errors
    // ========================================================================
    /// The demuxer could not seek to the requested position.
    #[error("Seek to {time:.3}s failed: {reason}")]
    SeekFailed {
        /// Requested seek target in seconds.
        time: f64,
        /// Reason reported by the demuxer.
        reason: String,
    },

    /// The track has no prepared playback context.
    #[error("Track has no playback context: {0}")]
    NoPlaybackContext(String),

    /// The playback context was used after being closed.
    #[error("Playback context is closed")]
    ContextClosed,

    /// The audio output device failed or is unavailable.
    #[error("Output device error: {0}")]
    OutputDevice(String),

    /// Configuration values failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error marks the end of the stream.
    pub fn is_eof(&self) -> bool {
        matches!(self, PlaybackError::EndOfStream)
    }

    /// Returns `true` for errors raised while preparing a track for playback.
    pub fn is_initialization_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::UnsupportedFormat(_)
                | PlaybackError::NoAudioStream(_)
                | PlaybackError::DrmProtected(_)
                | PlaybackError::CodecInit(_)
        )
    }

    /// Returns `true` if the track-loading pipeline should reject the track.
    pub fn rejects_track(&self) -> bool {
        matches!(
            self,
            PlaybackError::NoAudioStream(_) | PlaybackError::CodecInit(_)
        )
    }

    /// Returns `true` if the track stays listed but loses playback eligibility.
    pub fn strips_playback(&self) -> bool {
        matches!(self, PlaybackError::DrmProtected(_))
    }

    /// Returns `true` if the native backend refused the file and the generic
    /// backend should be tried instead.
    pub fn needs_generic_fallback(&self) -> bool {
        matches!(self, PlaybackError::UnsupportedFormat(_))
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
