//! Native backend: schedules frame-range segments of the track's file.

use super::engine::{Bound, BufferScheduler, Chunk, ChunkSource, SeekOutcome};
use super::segment::compute_segment;
use super::{PlaybackSegment, SchedulerEvent};
use crate::config::SchedulingConfig;
use crate::context::NativePlaybackContext;
use crate::error::{PlaybackError, Result};
use crate::session::{PlaybackSession, SessionRegistry};
use crate::time::{frame_for_time, time_for_frame};
use crate::traits::{AudioContext, OutputNode};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Scheduler for tracks with a native playback context.
pub type NativeScheduler = BufferScheduler<NativeChunkSource>;

impl NativeScheduler {
    /// Create a native scheduler feeding `output`.
    pub fn new(
        output: Arc<dyn OutputNode>,
        registry: Arc<SessionRegistry>,
        control: Sender<SchedulerEvent>,
        config: &SchedulingConfig,
    ) -> Result<Self> {
        Self::with_source(
            "native",
            NativeChunkSource::new(config),
            output,
            registry,
            control,
            config,
        )
    }
}

#[derive(Default)]
struct Cursor {
    context: Option<Arc<NativePlaybackContext>>,
    next_frame: i64,
    last_frame: i64,
    end_time: f64,
}

impl Cursor {
    fn is_exhausted(&self) -> bool {
        self.context.is_none() || self.next_frame > self.last_frame
    }
}

/// Slices the scheduled range of a native file into segments.
pub struct NativeChunkSource {
    immediate_seconds: f64,
    deferred_seconds: f64,
    min_segment_frames: i64,
    cursor: Mutex<Cursor>,
}

impl NativeChunkSource {
    fn new(config: &SchedulingConfig) -> Self {
        Self {
            immediate_seconds: config.immediate_buffer_seconds,
            deferred_seconds: config.deferred_buffer_seconds,
            min_segment_frames: config.min_segment_frames,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    fn context_of(session: &PlaybackSession) -> Result<Arc<NativePlaybackContext>> {
        session
            .track()
            .playback_context()
            .and_then(|context| context.as_native())
            .cloned()
            .ok_or_else(|| PlaybackError::NoPlaybackContext(session.track().id().to_string()))
    }
}

impl ChunkSource for NativeChunkSource {
    fn begin(&self, session: &PlaybackSession, start_time: f64, bound: Bound) -> Result<SeekOutcome> {
        let context = Self::context_of(session)?;
        let mut cursor = self.cursor.lock();
        *cursor = Cursor::default();

        if start_time >= context.duration() {
            debug!(start_time, "Start position is at the end of the track");
            return Ok(SeekOutcome::EndOfTrack);
        }

        let end_time = match bound {
            Bound::Track => None,
            Bound::Loop { end_time } => Some(end_time),
        };
        let segment = compute_segment(
            session,
            &context,
            start_time,
            end_time,
            None,
            self.min_segment_frames,
        )
        .ok_or_else(|| PlaybackError::SeekFailed {
            time: start_time,
            reason: "segment bounds are invalid".to_string(),
        })?;

        *cursor = Cursor {
            context: Some(context),
            next_frame: segment.first_frame,
            last_frame: segment.last_frame,
            end_time: segment.end_time,
        };
        Ok(SeekOutcome::Positioned)
    }

    fn next_chunk(&self, session: &PlaybackSession, immediate: bool, _bound: Bound) -> Option<Chunk> {
        let mut cursor = self.cursor.lock();
        if cursor.is_exhausted() {
            return None;
        }
        let context = Arc::clone(cursor.context.as_ref()?);

        let sample_rate = context.sample_rate() as f64;
        let seconds = if immediate {
            self.immediate_seconds
        } else {
            self.deferred_seconds
        };
        let size = frame_for_time(seconds, sample_rate).max(self.min_segment_frames.max(1));

        let first_frame = cursor.next_frame;
        let last_frame = (first_frame + size - 1).min(cursor.last_frame);
        let end_time = if last_frame == cursor.last_frame {
            cursor.end_time
        } else {
            time_for_frame(last_frame + 1, sample_rate)
        };
        cursor.next_frame = last_frame + 1;

        Some(Chunk::Segment(PlaybackSegment {
            session: session.clone(),
            file: context,
            first_frame,
            last_frame,
            frame_count: (last_frame - first_frame + 1) as u64,
            start_time: time_for_frame(first_frame, sample_rate),
            end_time,
        }))
    }

    fn is_exhausted(&self, _session: &PlaybackSession, _bound: Bound) -> bool {
        self.cursor.lock().is_exhausted()
    }

    fn reset_loop_state(&self, _session: &PlaybackSession) {}

    fn stop(&self) {
        *self.cursor.lock() = Cursor::default();
    }
}
