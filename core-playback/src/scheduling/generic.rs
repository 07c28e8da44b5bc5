//! Generic backend: schedules buffers decoded through the track's
//! [`GenericDecoder`](crate::decoder::GenericDecoder).

use super::engine::{Bound, BufferScheduler, Chunk, ChunkSource, SeekOutcome};
use super::SchedulerEvent;
use crate::config::SchedulingConfig;
use crate::context::GenericPlaybackContext;
use crate::error::{PlaybackError, Result};
use crate::session::{PlaybackSession, SessionRegistry};
use crate::traits::{AudioContext, OutputNode};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error};

/// Scheduler for tracks decoded by the generic backend.
pub type GenericScheduler = BufferScheduler<GenericChunkSource>;

impl GenericScheduler {
    /// Create a generic scheduler feeding `output`.
    pub fn new(
        output: Arc<dyn OutputNode>,
        registry: Arc<SessionRegistry>,
        control: Sender<SchedulerEvent>,
        config: &SchedulingConfig,
    ) -> Result<Self> {
        Self::with_source(
            "generic",
            GenericChunkSource::new(config),
            output,
            registry,
            control,
            config,
        )
    }
}

/// Pulls capped buffers out of the session's decoder.
pub struct GenericChunkSource {
    config: SchedulingConfig,
    active: Mutex<Option<Arc<GenericPlaybackContext>>>,
}

impl GenericChunkSource {
    fn new(config: &SchedulingConfig) -> Self {
        Self {
            config: config.clone(),
            active: Mutex::new(None),
        }
    }

    fn context_of(session: &PlaybackSession) -> Result<Arc<GenericPlaybackContext>> {
        session
            .track()
            .playback_context()
            .and_then(|context| context.as_generic())
            .cloned()
            .ok_or_else(|| PlaybackError::NoPlaybackContext(session.track().id().to_string()))
    }
}

impl ChunkSource for GenericChunkSource {
    fn begin(&self, session: &PlaybackSession, start_time: f64, bound: Bound) -> Result<SeekOutcome> {
        let context = Self::context_of(session)?;
        *self.active.lock() = Some(Arc::clone(&context));

        let reached_end = context.with_decoder(|decoder| -> Result<bool> {
            if matches!(bound, Bound::Loop { .. }) {
                decoder.reset_loop_state();
            }
            // A fresh decoder is already positioned at the start
            if start_time > 0.0 || !decoder.is_at_start() {
                decoder.seek(start_time)?;
            }
            Ok(decoder.is_eof())
        })??;

        if reached_end {
            debug!(start_time, "Seek landed at the end of the stream");
            Ok(SeekOutcome::EndOfTrack)
        } else {
            Ok(SeekOutcome::Positioned)
        }
    }

    fn next_chunk(&self, session: &PlaybackSession, immediate: bool, bound: Bound) -> Option<Chunk> {
        let context = match Self::context_of(session) {
            Ok(context) => context,
            Err(e) => {
                error!("Cannot decode: {}", e);
                return None;
            }
        };

        let sample_count = if immediate {
            self.config.immediate_buffer_samples(context.sample_rate())
        } else {
            self.config.deferred_buffer_samples(context.sample_rate())
        };

        let frame_buffer = match context.with_decoder(|decoder| match bound {
            Bound::Track => decoder.decode(sample_count),
            Bound::Loop { end_time } => decoder.decode_loop(sample_count, end_time),
        }) {
            Ok(frame_buffer) => frame_buffer,
            Err(e) => {
                error!("Cannot decode: {}", e);
                return None;
            }
        };

        let start_time = frame_buffer.start_timestamp().unwrap_or_default();
        frame_buffer
            .into_pcm_buffer()
            .map(|buffer| Chunk::Buffer { buffer, start_time })
    }

    fn is_exhausted(&self, session: &PlaybackSession, bound: Bound) -> bool {
        let Ok(context) = Self::context_of(session) else {
            return true;
        };
        let status = context.decoder_status();
        match bound {
            Bound::Track => status.is_eof(),
            Bound::Loop { .. } => status.is_end_of_loop(),
        }
    }

    fn reset_loop_state(&self, session: &PlaybackSession) {
        if let Ok(context) = Self::context_of(session) {
            if let Err(e) = context.with_decoder(|decoder| decoder.reset_loop_state()) {
                error!("Cannot reset loop state: {}", e);
            }
        }
    }

    fn stop(&self) {
        if let Some(context) = self.active.lock().as_ref() {
            context.stop_decoding();
        }
    }
}
