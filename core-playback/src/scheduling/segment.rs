//! Frame-range segments of natively playable files.

use crate::context::NativePlaybackContext;
use crate::error::Result;
use crate::output::PcmBuffer;
use crate::session::PlaybackSession;
use crate::time::{frame_for_time, time_for_frame};
use crate::traits::AudioContext;
use std::sync::Arc;
use tracing::debug;

/// A bounded frame range of a native file, scheduled as one unit.
#[derive(Debug, Clone)]
pub struct PlaybackSegment {
    /// Session the segment was computed for.
    pub session: PlaybackSession,
    /// File the frames are read from.
    pub file: Arc<NativePlaybackContext>,
    /// First frame, inclusive.
    pub first_frame: i64,
    /// Last frame, inclusive.
    pub last_frame: i64,
    /// `last_frame - first_frame + 1`, at least the configured floor.
    pub frame_count: u64,
    /// Start of the segment in seconds.
    pub start_time: f64,
    /// End of the segment in seconds.
    pub end_time: f64,
}

impl PlaybackSegment {
    /// Read the segment's frames from its file.
    pub fn read_buffer(&self) -> Result<PcmBuffer> {
        self.file.read_frames(self.first_frame, self.frame_count as usize)
    }
}

/// Compute the segment of `context` from `start_time` to `end_time` (the
/// end of the file when `None`).
///
/// An explicit `start_frame` takes precedence over `start_time`, and the
/// segment's start time is then derived from it. A range shorter than
/// `min_frames` is stretched backward from its last frame. Returns `None`
/// for invalid bounds or an empty file.
pub fn compute_segment(
    session: &PlaybackSession,
    context: &Arc<NativePlaybackContext>,
    start_time: f64,
    end_time: Option<f64>,
    start_frame: Option<i64>,
    min_frames: i64,
) -> Option<PlaybackSegment> {
    if !bounds_are_valid(start_time, end_time) || context.frame_count() == 0 {
        debug!(start_time, ?end_time, "Refusing invalid segment bounds");
        return None;
    }

    let sample_rate = context.sample_rate() as f64;
    let last_frame_in_file = context.frame_count() as i64 - 1;

    let mut first_frame = start_frame.unwrap_or_else(|| frame_for_time(start_time, sample_rate));
    let (last_frame, segment_end_time) = match end_time {
        // Rounding may land one past the file
        Some(end) => (frame_for_time(end, sample_rate).min(last_frame_in_file), end),
        None => (last_frame_in_file, session.track().duration()),
    };

    let mut frame_count = last_frame - first_frame + 1;
    let min_frames = min_frames.max(1);
    if frame_count < min_frames {
        first_frame = (last_frame - min_frames + 1).max(0);
        frame_count = last_frame - first_frame + 1;
    }

    let segment_start_time = match start_frame {
        Some(_) => time_for_frame(first_frame, sample_rate),
        None => start_time,
    };

    Some(PlaybackSegment {
        session: session.clone(),
        file: Arc::clone(context),
        first_frame,
        last_frame,
        frame_count: frame_count as u64,
        start_time: segment_start_time,
        end_time: segment_end_time,
    })
}

fn bounds_are_valid(start_time: f64, end_time: Option<f64>) -> bool {
    start_time.is_finite()
        && start_time >= 0.0
        && end_time.map_or(true, |end| end.is_finite() && end >= start_time)
}
