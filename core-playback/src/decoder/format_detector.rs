//! # Format Detection Module
//!
//! Probe hints, codec identification and backend eligibility.

use crate::error::{PlaybackError, Result};
use crate::traits::AudioCodec;
use std::path::Path;
use symphonia::core::codecs::CodecType;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Extensions the native backend reads directly.
const NATIVE_EXTENSIONS: &[&str] = &["wav", "wave"];

/// Format detector for audio files.
pub struct FormatDetector;

impl FormatDetector {
    /// Create a probe hint from the file extension.
    pub fn hint_from_path(path: &Path) -> Hint {
        let mut hint = Hint::new();

        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            debug!("Setting probe hint extension: {}", extension);
            hint.with_extension(extension);
        }

        hint
    }

    /// Returns `true` if the native backend can open `path`.
    pub fn is_natively_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                NATIVE_EXTENSIONS
                    .iter()
                    .any(|native| ext.eq_ignore_ascii_case(native))
            })
            .unwrap_or(false)
    }

    /// Map a Symphonia codec type to an [`AudioCodec`].
    pub fn detect_codec(codec_type: CodecType) -> AudioCodec {
        use symphonia::core::codecs::*;

        match codec_type {
            CODEC_TYPE_MP3 => AudioCodec::Mp3,
            CODEC_TYPE_AAC => AudioCodec::Aac,
            CODEC_TYPE_FLAC => AudioCodec::Flac,
            CODEC_TYPE_VORBIS => AudioCodec::Vorbis,
            CODEC_TYPE_OPUS => AudioCodec::Opus,
            CODEC_TYPE_ALAC => AudioCodec::Alac,
            CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE | CODEC_TYPE_PCM_S24LE
            | CODEC_TYPE_PCM_S24BE | CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE
            | CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE | CODEC_TYPE_PCM_F64LE
            | CODEC_TYPE_PCM_F64BE | CODEC_TYPE_PCM_U8 => AudioCodec::Wav,
            other => {
                warn!("Unknown codec type: {:?}", other);
                AudioCodec::Unknown
            }
        }
    }

    /// Reject codecs the generic backend has no decoder for.
    pub fn validate_codec_support(codec: &AudioCodec) -> Result<()> {
        match codec {
            AudioCodec::Unknown => Err(PlaybackError::CodecInit(
                "Unknown audio codec".to_string(),
            )),
            AudioCodec::Other(name) => Err(PlaybackError::CodecInit(format!(
                "Unsupported codec: {}",
                name
            ))),
            _ => Ok(()),
        }
    }

    /// Get the common file extension for a codec.
    pub fn codec_extension(codec: &AudioCodec) -> &'static str {
        match codec {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Aac | AudioCodec::Alac => "m4a",
            AudioCodec::Flac => "flac",
            AudioCodec::Vorbis => "ogg",
            AudioCodec::Opus => "opus",
            AudioCodec::Wav => "wav",
            AudioCodec::Unknown | AudioCodec::Other(_) => "bin",
        }
    }
}
