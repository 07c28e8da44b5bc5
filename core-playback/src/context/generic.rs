//! Generic playback context: a demuxer/codec pair behind a [`GenericDecoder`].

use crate::config::SchedulingConfig;
use crate::decoder::{DecoderStatus, GenericDecoder, StreamOpener, SymphoniaOpener};
use crate::error::{PlaybackError, Result};
use crate::traits::{AudioContext, AudioFormat};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// An opened container for a track the native backend cannot play.
///
/// The decoder is created on open and destroyed on close; [`with_decoder`]
/// re-opens transparently so a context closed between tracks can be
/// played again.
///
/// [`with_decoder`]: GenericPlaybackContext::with_decoder
pub struct GenericPlaybackContext {
    file: PathBuf,
    opener: Box<dyn StreamOpener>,
    config: SchedulingConfig,
    format: AudioFormat,
    frame_count: u64,
    duration: f64,
    status: Arc<DecoderStatus>,
    decoder: Mutex<Option<GenericDecoder>>,
}

impl GenericPlaybackContext {
    /// Probe `path` with Symphonia.
    pub fn open_file(path: impl AsRef<Path>, config: &SchedulingConfig) -> Result<Self> {
        let path = path.as_ref();
        Self::from_opener(path, Box::new(SymphoniaOpener::new(path)), config)
    }

    /// Build a context around any [`StreamOpener`].
    #[instrument(skip(file, opener, config), fields(file = %file.as_ref().display()))]
    pub fn from_opener(
        file: impl AsRef<Path>,
        opener: Box<dyn StreamOpener>,
        config: &SchedulingConfig,
    ) -> Result<Self> {
        let stream = opener.open_stream()?;
        let format = stream.format.clone();
        let mut frame_count = stream.frame_count;
        let mut duration = match stream.demuxer.duration() {
            d if d > 0.0 => d,
            _ if format.sample_rate > 0 => frame_count as f64 / format.sample_rate as f64,
            _ => 0.0,
        };
        if duration <= 0.0 {
            duration = scan_duration(opener.as_ref())?;
            debug!(duration, "Container reports no duration, measured from packets");
        }
        if frame_count == 0 {
            frame_count = (duration * format.sample_rate as f64).round() as u64;
        }

        let status = Arc::new(DecoderStatus::default());
        let decoder = GenericDecoder::new(stream, Arc::clone(&status), config);
        debug!(duration, "Opened generic context");

        Ok(Self {
            file: file.as_ref().to_path_buf(),
            opener,
            config: config.clone(),
            format,
            frame_count,
            duration,
            status,
            decoder: Mutex::new(Some(decoder)),
        })
    }

    /// Run `f` with exclusive access to the decoder, opening it if needed.
    pub fn with_decoder<R>(&self, f: impl FnOnce(&mut GenericDecoder) -> R) -> Result<R> {
        let mut guard = self.decoder.lock();
        if guard.is_none() {
            *guard = Some(self.create_decoder()?);
        }
        match guard.as_mut() {
            Some(decoder) => Ok(f(decoder)),
            None => Err(PlaybackError::ContextClosed),
        }
    }

    /// Drop pending decoded frames without opening a closed decoder.
    pub fn stop_decoding(&self) {
        if let Some(decoder) = self.decoder.lock().as_mut() {
            decoder.stop();
        }
    }

    /// Flags shared with the decoder, readable without the decoder lock.
    pub fn decoder_status(&self) -> &Arc<DecoderStatus> {
        &self.status
    }

    fn create_decoder(&self) -> Result<GenericDecoder> {
        let stream = self.opener.open_stream()?;
        debug!(path = %self.file.display(), "Re-opened generic context");
        Ok(GenericDecoder::new(stream, Arc::clone(&self.status), &self.config))
    }
}

/// End time of the last packet of a freshly opened stream.
fn scan_duration(opener: &dyn StreamOpener) -> Result<f64> {
    let mut stream = opener.open_stream()?;
    let time_base = stream.demuxer.time_base();
    let mut end: f64 = 0.0;
    loop {
        match stream.demuxer.read_packet() {
            Ok(packet) => {
                let packet_end = stream.demuxer.packet_time(&packet) + packet.duration as f64 * time_base;
                end = end.max(packet_end);
            }
            Err(e) if e.is_eof() => break,
            Err(e) => {
                warn!("Stopped measuring duration at {:.3}s: {}", end, e);
                break;
            }
        }
    }
    Ok(end)
}

impl AudioContext for GenericPlaybackContext {
    fn open(&self) -> Result<()> {
        let mut guard = self.decoder.lock();
        if guard.is_none() {
            *guard = Some(self.create_decoder()?);
        }
        Ok(())
    }

    fn close(&self) {
        if let Some(mut decoder) = self.decoder.lock().take() {
            decoder.destroy();
        }
    }

    fn is_open(&self) -> bool {
        self.decoder.lock().is_some()
    }

    fn file(&self) -> &Path {
        &self.file
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn audio_format(&self) -> &AudioFormat {
        &self.format
    }
}

impl fmt::Debug for GenericPlaybackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericPlaybackContext")
            .field("file", &self.file)
            .field("format", &self.format)
            .field("duration", &self.duration)
            .finish()
    }
}

impl Drop for GenericPlaybackContext {
    fn drop(&mut self) {
        self.close();
    }
}
