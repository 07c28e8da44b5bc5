//! Native playback context: frame-addressable PCM files read through hound.

use crate::decoder::FormatDetector;
use crate::error::{PlaybackError, Result};
use crate::output::PcmBuffer;
use crate::traits::{AudioCodec, AudioContext, AudioFormat};
use hound::{WavReader, WavSpec};
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace};

type Reader = WavReader<BufReader<File>>;

/// An open handle on a natively playable file.
///
/// Reads are frame addressed, which is what lets the native scheduler hand
/// the output node exact segments instead of decoded buffers.
pub struct NativePlaybackContext {
    file: PathBuf,
    reader: Mutex<Option<Reader>>,
    spec: WavSpec,
    format: AudioFormat,
    frame_count: u64,
}

impl NativePlaybackContext {
    /// Open `path` with the native backend.
    ///
    /// Returns [`PlaybackError::UnsupportedFormat`] for files the backend
    /// cannot read, which callers treat as a cue to try the generic backend.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !FormatDetector::is_natively_supported(path) {
            return Err(PlaybackError::UnsupportedFormat(path.display().to_string()));
        }

        let reader = WavReader::open(path).map_err(map_hound_error)?;
        let spec = reader.spec();
        let frame_count = u64::from(reader.duration());
        let format = AudioFormat::new(
            AudioCodec::Wav,
            spec.sample_rate,
            spec.channels,
            Some(spec.bits_per_sample),
        );
        debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            frame_count,
            "Opened native context"
        );

        Ok(Self {
            file: path.to_path_buf(),
            reader: Mutex::new(Some(reader)),
            spec,
            format,
            frame_count,
        })
    }

    /// Read `count` frames starting at `first_frame` as interleaved `f32`.
    ///
    /// The range is clipped to the file; reading past the end yields a
    /// shorter (possibly empty) buffer.
    pub fn read_frames(&self, first_frame: i64, count: usize) -> Result<PcmBuffer> {
        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or(PlaybackError::ContextClosed)?;

        let first = first_frame.clamp(0, self.frame_count as i64) as u32;
        reader.seek(first)?;

        let wanted = count * self.spec.channels as usize;
        let samples: Vec<f32> = match self.spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .take(wanted)
                .collect::<std::result::Result<_, _>>()
                .map_err(map_hound_error)?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (self.spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .take(wanted)
                    .map(|sample| sample.map(|value| value as f32 * scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(map_hound_error)?
            }
        };

        trace!(
            first_frame = first,
            samples = samples.len(),
            "Read native frames"
        );
        Ok(PcmBuffer::new(samples, self.spec.channels, self.spec.sample_rate))
    }
}

fn map_hound_error(error: hound::Error) -> PlaybackError {
    match error {
        hound::Error::IoError(e) => PlaybackError::IoError(e),
        other => PlaybackError::UnsupportedFormat(other.to_string()),
    }
}

impl AudioContext for NativePlaybackContext {
    fn open(&self) -> Result<()> {
        let mut guard = self.reader.lock();
        if guard.is_none() {
            *guard = Some(WavReader::open(&self.file).map_err(map_hound_error)?);
            debug!(path = %self.file.display(), "Re-opened native context");
        }
        Ok(())
    }

    fn close(&self) {
        if self.reader.lock().take().is_some() {
            debug!(path = %self.file.display(), "Closed native context");
        }
    }

    fn is_open(&self) -> bool {
        self.reader.lock().is_some()
    }

    fn file(&self) -> &Path {
        &self.file
    }

    fn duration(&self) -> f64 {
        if self.spec.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.spec.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn audio_format(&self) -> &AudioFormat {
        &self.format
    }
}

impl fmt::Debug for NativePlaybackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativePlaybackContext")
            .field("file", &self.file)
            .field("format", &self.format)
            .field("frame_count", &self.frame_count)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for NativePlaybackContext {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, frames: u32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 1000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample((i % 100) as i16 * 100).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_open_reads_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 2500);

        let context = NativePlaybackContext::open_file(&path).unwrap();
        assert_eq!(context.frame_count(), 2500);
        assert_eq!(context.sample_rate(), 1000);
        assert_eq!(context.duration(), 2.5);
        assert_eq!(context.audio_format().channels, 1);
    }

    #[test]
    fn test_non_native_extension_is_refused() {
        let err = NativePlaybackContext::open_file("/music/song.flac").unwrap_err();
        assert!(err.needs_generic_fallback());
    }

    #[test]
    fn test_read_frames_clips_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 1000);
        let context = NativePlaybackContext::open_file(&path).unwrap();

        let buffer = context.read_frames(10, 5).unwrap();
        assert_eq!(buffer.frame_count(), 5);
        assert!((buffer.samples()[0] - 1000.0 / 32768.0).abs() < 1e-6);

        let tail = context.read_frames(990, 50).unwrap();
        assert_eq!(tail.frame_count(), 10);
    }

    #[test]
    fn test_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 100);
        let context = NativePlaybackContext::open_file(&path).unwrap();

        context.close();
        context.close();
        assert!(!context.is_open());
        assert!(matches!(
            context.read_frames(0, 1),
            Err(PlaybackError::ContextClosed)
        ));

        context.open().unwrap();
        assert_eq!(context.read_frames(0, 10).unwrap().frame_count(), 10);
    }

    #[test]
    fn test_drop_shares_close_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 100);

        let open = NativePlaybackContext::open_file(&path).unwrap();
        drop(open);

        let closed = NativePlaybackContext::open_file(&path).unwrap();
        closed.close();
        drop(closed);

        // The file is free for a fresh context afterwards
        let reopened = NativePlaybackContext::open_file(&path).unwrap();
        assert_eq!(reopened.read_frames(0, 100).unwrap().frame_count(), 100);
    }
}
