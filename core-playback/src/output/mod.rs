//! # Output
//!
//! The [`OutputNode`](crate::traits::OutputNode) implementation that
//! schedulers push decoded audio into, and the buffer type they push.
//!
//! [`PlayerNode`] is pull driven: a host audio callback (see the optional
//! `device-cpal` feature) calls [`PlayerNode::render`] for every period.
//! Finished buffers are handed to a dedicated completion thread so
//! completions never run on the render or scheduling threads.

mod player_node;

#[cfg(feature = "device-cpal")]
mod device;

pub use player_node::PlayerNode;

#[cfg(feature = "device-cpal")]
pub use device::CpalDevice;

/// Interleaved `f32` audio ready for the output node.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Wrap interleaved samples. A trailing partial frame is discarded.
    pub fn new(mut samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Buffer of `frames` frames of silence.
    pub fn silence(frames: usize, channels: u16, sample_rate: u32) -> Self {
        Self::new(vec![0.0; frames * channels.max(1) as usize], channels, sample_rate)
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns `true` if the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playing time in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Sample of `channel` in `frame`, mapping missing channels onto the
    /// ones present.
    pub(crate) fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.channels as usize;
        self.samples[frame * channels + channel % channels]
    }
}
