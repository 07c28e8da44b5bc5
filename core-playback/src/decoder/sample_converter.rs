//! # Sample Format Converter
//!
//! Converts Symphonia's planar buffers of any sample type into the
//! interleaved `f32` frames the output node consumes.

use crate::traits::SampleFormat;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::conv::IntoSample;
use symphonia::core::sample::Sample;

/// Sample converter that normalizes audio to f32 interleaved format.
pub struct SampleConverter;

impl SampleConverter {
    /// Convert a decoded buffer to interleaved `f32` in `[-1.0, 1.0]`,
    /// returning the format it was decoded in.
    pub fn to_interleaved_f32(buffer: &AudioBufferRef<'_>) -> (SampleFormat, Vec<f32>) {
        match buffer {
            AudioBufferRef::U8(buf) => (SampleFormat::U8, Self::interleave(buf)),
            AudioBufferRef::U16(buf) => (SampleFormat::U16, Self::interleave(buf)),
            AudioBufferRef::U24(buf) => (SampleFormat::U24, Self::interleave(buf)),
            AudioBufferRef::U32(buf) => (SampleFormat::U32, Self::interleave(buf)),
            AudioBufferRef::S8(buf) => (SampleFormat::S8, Self::interleave(buf)),
            AudioBufferRef::S16(buf) => (SampleFormat::S16, Self::interleave(buf)),
            AudioBufferRef::S24(buf) => (SampleFormat::S24, Self::interleave(buf)),
            AudioBufferRef::S32(buf) => (SampleFormat::S32, Self::interleave(buf)),
            AudioBufferRef::F32(buf) => (SampleFormat::F32, Self::interleave(buf)),
            AudioBufferRef::F64(buf) => (SampleFormat::F64, Self::interleave(buf)),
        }
    }

    /// Interleave planes (LLLL...RRRR...) into LRLR..., converting each sample.
    fn interleave<T>(buf: &AudioBuffer<T>) -> Vec<f32>
    where
        T: Sample + IntoSample<f32> + Copy,
    {
        let channels = buf.spec().channels.count();
        let frames = buf.frames();
        let mut interleaved = Vec::with_capacity(frames * channels);

        for frame_idx in 0..frames {
            for chan_idx in 0..channels {
                interleaved.push(buf.chan(chan_idx)[frame_idx].into_sample());
            }
        }

        interleaved
    }

    /// Clamp samples to the valid range [-1.0, 1.0].
    pub fn clamp_samples(samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use symphonia::core::audio::{Channels, SignalSpec};

    #[test]
    fn test_planar_s16_is_interleaved_and_normalized() {
        let spec = SignalSpec::new(44100, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let mut buf = AudioBuffer::<i16>::new(4, spec);
        buf.render_reserved(Some(2));
        buf.chan_mut(0).copy_from_slice(&[i16::MAX, 0]);
        buf.chan_mut(1).copy_from_slice(&[i16::MIN, 0]);

        let (format, samples) =
            SampleConverter::to_interleaved_f32(&AudioBufferRef::S16(Cow::Borrowed(&buf)));

        assert_eq!(format, SampleFormat::S16);
        assert_eq!(samples.len(), 4);
        assert!((samples[0] - 1.0).abs() < 1e-3);
        assert!((samples[1] + 1.0).abs() < 1e-3);
        assert_eq!(samples[2], 0.0);
    }

    #[test]
    fn test_f32_passes_through() {
        let spec = SignalSpec::new(48000, Channels::FRONT_LEFT);
        let mut buf = AudioBuffer::<f32>::new(3, spec);
        buf.render_reserved(Some(3));
        buf.chan_mut(0).copy_from_slice(&[0.1, -0.2, 0.3]);

        let (format, samples) =
            SampleConverter::to_interleaved_f32(&AudioBufferRef::F32(Cow::Borrowed(&buf)));

        assert_eq!(format, SampleFormat::F32);
        assert_eq!(samples, vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_clamp_samples() {
        let mut samples = vec![0.0, 1.5, -1.5, 0.5];
        SampleConverter::clamp_samples(&mut samples);
        assert_eq!(samples, vec![0.0, 1.0, -1.0, 0.5]);
    }
}
