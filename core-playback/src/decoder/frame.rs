//! Decoded frames and the capped buffers assembled from them.

use crate::output::PcmBuffer;
use crate::traits::SampleFormat;

/// One block of decoded audio as produced by a codec.
///
/// Samples are interleaved `f32`. "Sample count" counts frames per channel,
/// so a stereo frame with 1024 samples holds 2048 values.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    pts: i64,
    source_format: SampleFormat,
    start_timestamp: f64,
}

impl Frame {
    /// Create a frame from interleaved samples.
    pub fn new(
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        pts: i64,
        source_format: SampleFormat,
    ) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
            pts,
            source_format,
            start_timestamp: 0.0,
        }
    }

    /// Number of samples per channel.
    pub fn sample_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate of the frame.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Timestamp of the packet this frame was decoded from, in time-base units.
    pub fn pts(&self) -> i64 {
        self.pts
    }

    /// Sample format the codec produced before conversion to `f32`.
    pub fn source_format(&self) -> SampleFormat {
        self.source_format
    }

    /// Time of the first sample in seconds.
    pub fn start_timestamp(&self) -> f64 {
        self.start_timestamp
    }

    /// Time just past the last sample in seconds.
    pub fn end_timestamp(&self) -> f64 {
        self.start_timestamp + self.duration()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f64 / self.sample_rate as f64
    }

    pub(crate) fn set_start_timestamp(&mut self, seconds: f64) {
        self.start_timestamp = seconds;
    }

    /// Drop leading samples so only the last `count` remain.
    pub fn keep_last_n_samples(&mut self, count: usize) {
        let total = self.sample_count();
        if count >= total {
            return;
        }
        let dropped = total - count;
        self.samples.drain(..dropped * self.channels as usize);
        if self.sample_rate > 0 {
            self.start_timestamp += dropped as f64 / self.sample_rate as f64;
        }
    }

    /// Drop trailing samples so only the first `count` remain.
    pub fn keep_first_n_samples(&mut self, count: usize) {
        if count < self.sample_count() {
            self.samples.truncate(count * self.channels as usize);
        }
    }
}

/// Assign consecutive start timestamps to the frames of one packet.
pub(crate) fn stamp_frames(frames: &mut [Frame], packet_time: f64) {
    let mut time = packet_time;
    for frame in frames.iter_mut() {
        frame.set_start_timestamp(time);
        time = frame.end_timestamp();
    }
}

/// Drop leading samples across the frames of one packet so that only the
/// last `keep` samples survive.
pub(crate) fn keep_last_samples_of_packet(frames: &mut Vec<Frame>, keep: usize) {
    let total: usize = frames.iter().map(Frame::sample_count).sum();
    if keep >= total {
        return;
    }

    let mut to_drop = total - keep;
    while let Some(first) = frames.first_mut() {
        let count = first.sample_count();
        if to_drop >= count {
            to_drop -= count;
            frames.remove(0);
            continue;
        }
        first.keep_last_n_samples(count - to_drop);
        break;
    }
}

/// A capped accumulation of decoded frames, ready to become one output buffer.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    sample_rate: u32,
    channels: u16,
    max_sample_count: usize,
    sample_count: usize,
    frames: Vec<Frame>,
    needs_format_conversion: bool,
    has_terminal_frames: bool,
}

impl FrameBuffer {
    /// Create an empty buffer holding at most `max_sample_count` samples
    /// per channel, terminal frames excepted.
    pub fn new(sample_rate: u32, channels: u16, max_sample_count: usize) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            max_sample_count,
            sample_count: 0,
            frames: Vec::new(),
            needs_format_conversion: false,
            has_terminal_frames: false,
        }
    }

    /// Returns `true` if `frame` fits. An empty buffer accepts any frame so
    /// an oversized frame can never stall decoding.
    pub fn accepts(&self, frame: &Frame) -> bool {
        self.sample_count == 0 || self.sample_count + frame.sample_count() <= self.max_sample_count
    }

    /// Append a frame. Callers check [`accepts`](Self::accepts) first.
    pub fn push(&mut self, frame: Frame) {
        self.sample_count += frame.sample_count();
        self.needs_format_conversion |= frame.source_format().needs_conversion();
        self.frames.push(frame);
    }

    /// Append frames drained at end of stream. These are never rejected.
    pub fn append_terminal_frames(&mut self, frames: Vec<Frame>) {
        if frames.is_empty() {
            return;
        }
        self.has_terminal_frames = true;
        for frame in frames {
            self.push(frame);
        }
    }

    /// Samples per channel held.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Capacity for non-terminal frames.
    pub fn max_sample_count(&self) -> usize {
        self.max_sample_count
    }

    /// Returns `true` if no samples were accumulated.
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// The accumulated frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Returns `true` if any frame had to be converted to `f32`.
    pub fn needs_format_conversion(&self) -> bool {
        self.needs_format_conversion
    }

    /// Returns `true` if terminal frames were appended.
    pub fn has_terminal_frames(&self) -> bool {
        self.has_terminal_frames
    }

    /// Timestamp of the first sample, if any.
    pub fn start_timestamp(&self) -> Option<f64> {
        self.frames.first().map(Frame::start_timestamp)
    }

    /// Concatenate the frames into one output buffer. `None` when empty.
    pub fn into_pcm_buffer(self) -> Option<PcmBuffer> {
        if self.sample_count == 0 {
            return None;
        }
        let mut samples = Vec::with_capacity(self.sample_count * self.channels as usize);
        for frame in &self.frames {
            samples.extend_from_slice(frame.samples());
        }
        Some(PcmBuffer::new(samples, self.channels, self.sample_rate))
    }
}
