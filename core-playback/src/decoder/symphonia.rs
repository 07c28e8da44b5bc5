//! # Symphonia Demuxer and Codec
//!
//! Production implementations of [`Demuxer`] and [`Codec`] on top of the
//! Symphonia library, and the [`StreamOpener`] used by generic playback
//! contexts.

use crate::decoder::format_detector::FormatDetector;
use crate::decoder::sample_converter::SampleConverter;
use crate::decoder::{Frame, OpenedStream, StreamOpener};
use crate::error::{PlaybackError, Result};
use crate::traits::{AudioFormat, Codec, Demuxer, Packet};
use bytes::Bytes;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision};
use symphonia::core::units::Time;
use tracing::{debug, error, info, instrument, warn};

/// Tag key fragments that mark an encrypted stream.
const DRM_TAG_MARKERS: &[&str] = &["drm", "encrypt", "protection"];

// ============================================================================
// Opener
// ============================================================================

/// Opens files through Symphonia's probe.
#[derive(Debug, Clone)]
pub struct SymphoniaOpener {
    path: PathBuf,
}

impl SymphoniaOpener {
    /// Create an opener for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StreamOpener for SymphoniaOpener {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn open_stream(&self) -> Result<OpenedStream> {
        let file = File::open(&self.path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let hint = FormatDetector::hint_from_path(&self.path);

        let mut probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                error!("Format probe failed: {}", e);
                PlaybackError::CodecInit(format!("Unrecognized container: {}", e))
            })?;

        let protected = probed
            .metadata
            .get()
            .as_ref()
            .and_then(|metadata| metadata.current())
            .map_or(false, is_drm_protected)
            || probed
                .format
                .metadata()
                .current()
                .map_or(false, is_drm_protected);
        if protected {
            warn!("Refusing DRM protected stream");
            return Err(PlaybackError::DrmProtected(display_name(&self.path)));
        }

        let track = probed
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| PlaybackError::NoAudioStream(display_name(&self.path)))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let codec = FormatDetector::detect_codec(params.codec);
        FormatDetector::validate_codec_support(&codec)?;

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| PlaybackError::CodecInit("Missing sample rate".to_string()))?;
        let channels = params.channels.map(|ch| ch.count() as u16).unwrap_or(2);
        let bits_per_sample = params.bits_per_sample.map(|b| b as u16);
        let time_base = params
            .time_base
            .map(|tb| tb.numer as f64 / tb.denom as f64)
            .unwrap_or(1.0 / sample_rate as f64);
        let frame_count = params.n_frames.unwrap_or(0);
        let duration = frame_count as f64 / sample_rate as f64;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create decoder: {}", e);
                PlaybackError::CodecInit(format!("Failed to create codec decoder: {}", e))
            })?;

        info!(?codec, sample_rate, channels, duration, "Opened audio stream");

        Ok(OpenedStream {
            demuxer: Box::new(SymphoniaDemuxer {
                reader: probed.format,
                track_id,
                time_base,
                duration,
            }),
            codec: Box::new(SymphoniaCodec {
                decoder,
                track_id,
                sample_rate,
                channels,
            }),
            format: AudioFormat::new(codec, sample_rate, channels, bits_per_sample),
            frame_count,
        })
    }
}

fn is_drm_protected(revision: &MetadataRevision) -> bool {
    revision.tags().iter().any(|tag| {
        let key = tag.key.to_ascii_lowercase();
        DRM_TAG_MARKERS.iter().any(|marker| key.contains(marker))
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Demuxer
// ============================================================================

/// Packet reader for one audio track of a container.
pub struct SymphoniaDemuxer {
    reader: Box<dyn FormatReader>,
    track_id: u32,
    time_base: f64,
    duration: f64,
}

impl Demuxer for SymphoniaDemuxer {
    fn time_base(&self) -> f64 {
        self.time_base
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn read_packet(&mut self) -> Result<Packet> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(PlaybackError::EndOfStream);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Track list changed, reset required");
                    return Err(PlaybackError::DecodingError(
                        "Track list changed, reset required".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(PlaybackError::CorruptedStream(format!(
                        "Failed to read packet: {}",
                        e
                    )));
                }
            };

            // Packets of other tracks (video, artwork) are skipped
            if packet.track_id() != self.track_id {
                continue;
            }

            return Ok(Packet {
                pts: packet.ts() as i64,
                duration: packet.dur(),
                data: Bytes::from(packet.data.into_vec()),
            });
        }
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        if self.duration > 0.0 && time >= self.duration {
            return Err(PlaybackError::EndOfStream);
        }

        let seek_to = SeekTo::Time {
            time: Time::from(time.max(0.0)),
            track_id: Some(self.track_id),
        };

        match self.reader.seek(SeekMode::Accurate, seek_to) {
            Ok(seeked) => {
                debug!(
                    required = seeked.required_ts,
                    actual = seeked.actual_ts,
                    "Demuxer seek completed"
                );
                Ok(())
            }
            Err(SymphoniaError::SeekError(SeekErrorKind::OutOfRange)) => {
                Err(PlaybackError::EndOfStream)
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(PlaybackError::EndOfStream)
            }
            Err(e) => Err(PlaybackError::SeekFailed {
                time,
                reason: e.to_string(),
            }),
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Symphonia codec decoding packets to `f32` frames.
pub struct SymphoniaCodec {
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
}

impl Codec for SymphoniaCodec {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        let input = symphonia::core::formats::Packet::new_from_slice(
            self.track_id,
            packet.pts.max(0) as u64,
            packet.duration,
            &packet.data,
        );

        match self.decoder.decode(&input) {
            Ok(decoded) => {
                if decoded.frames() == 0 {
                    return Ok(Vec::new());
                }
                let spec = *decoded.spec();
                let (source_format, samples) = SampleConverter::to_interleaved_f32(&decoded);
                let channels = spec.channels.count() as u16;
                if channels != self.channels {
                    debug!(
                        "Updating channel count from {} to {} (detected from decoded audio)",
                        self.channels, channels
                    );
                    self.channels = channels;
                }
                Ok(vec![Frame::new(
                    samples,
                    channels,
                    spec.rate,
                    packet.pts,
                    source_format,
                )])
            }
            Err(SymphoniaError::DecodeError(e)) => Err(PlaybackError::DecodingError(e.to_string())),
            Err(SymphoniaError::IoError(e)) => Err(PlaybackError::CorruptedStream(e.to_string())),
            Err(e) => Err(PlaybackError::DecodingError(e.to_string())),
        }
    }

    /// Symphonia decoders emit every frame from `decode`, so nothing is
    /// buffered inside the codec at end of stream.
    fn drain(&mut self) -> Result<Vec<Frame>> {
        Ok(Vec::new())
    }

    fn flush(&mut self) {
        self.decoder.reset();
    }
}
