//! Generic-codec decoder: capped buffer decoding, loop truncation and
//! seek correction on top of a [`Demuxer`] and a [`Codec`].

use super::{keep_last_samples_of_packet, stamp_frames, Frame, FrameBuffer, OpenedStream};
use crate::config::SchedulingConfig;
use crate::error::{PlaybackError, Result};
use crate::traits::{Codec, Demuxer, Packet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, instrument, trace, warn};

/// End-of-file and end-of-loop flags of a decoder.
#[derive(Debug, Default)]
pub struct DecoderStatus {
    eof: AtomicBool,
    end_of_loop: AtomicBool,
}

impl DecoderStatus {
    /// Returns `true` once the demuxer ran out of packets.
    pub fn is_eof(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }

    /// Returns `true` once decoding reached the loop end.
    pub fn is_end_of_loop(&self) -> bool {
        self.end_of_loop.load(Ordering::Acquire)
    }

    pub(crate) fn set_eof(&self, value: bool) {
        self.eof.store(value, Ordering::Release);
    }

    pub(crate) fn set_end_of_loop(&self, value: bool) {
        self.end_of_loop.store(value, Ordering::Release);
    }
}

struct Pipeline {
    demuxer: Box<dyn Demuxer>,
    codec: Box<dyn Codec>,
}

/// Decoder for formats the native backend cannot play.
pub struct GenericDecoder {
    pipeline: Option<Pipeline>,
    frame_queue: VecDeque<Frame>,
    status: Arc<DecoderStatus>,
    sample_rate: u32,
    channels: u16,
    seek_tolerance: f64,
    max_consecutive_errors: u32,
    drained: bool,
    at_start: bool,
}

impl GenericDecoder {
    /// Wrap an opened stream. `status` is shared with the owning context.
    pub fn new(stream: OpenedStream, status: Arc<DecoderStatus>, config: &SchedulingConfig) -> Self {
        status.set_eof(false);
        status.set_end_of_loop(false);
        Self {
            sample_rate: stream.codec.sample_rate(),
            channels: stream.codec.channels(),
            pipeline: Some(Pipeline {
                demuxer: stream.demuxer,
                codec: stream.codec,
            }),
            frame_queue: VecDeque::new(),
            status,
            seek_tolerance: config.seek_tolerance_seconds,
            max_consecutive_errors: config.max_consecutive_decode_errors,
            drained: false,
            at_start: true,
        }
    }

    /// Shared EOF/end-of-loop flags.
    pub fn status(&self) -> &Arc<DecoderStatus> {
        &self.status
    }

    /// Returns `true` once the demuxer ran out of packets.
    pub fn is_eof(&self) -> bool {
        self.status.is_eof()
    }

    /// Returns `true` once loop decoding reached the loop end.
    pub fn is_end_of_loop(&self) -> bool {
        self.status.is_end_of_loop()
    }

    /// Returns `true` if nothing has been read since the stream was opened.
    pub fn is_at_start(&self) -> bool {
        self.at_start
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Output channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames waiting in the pending queue.
    pub fn pending_frames(&self) -> usize {
        self.frame_queue.len()
    }

    /// Decode until `max_sample_count` samples per channel are accumulated
    /// or the stream ends. At end of stream the pending queue and the codec
    /// are drained into the buffer as terminal frames.
    #[instrument(skip(self), level = "trace")]
    pub fn decode(&mut self, max_sample_count: usize) -> FrameBuffer {
        let mut buffer = FrameBuffer::new(self.sample_rate, self.channels, max_sample_count);
        self.fill(&mut buffer, None);
        buffer
    }

    /// Like [`decode`](Self::decode), but stops at `loop_end_time` and raises
    /// the end-of-loop flag instead of running past it.
    #[instrument(skip(self), level = "trace")]
    pub fn decode_loop(&mut self, max_sample_count: usize, loop_end_time: f64) -> FrameBuffer {
        let mut buffer = FrameBuffer::new(self.sample_rate, self.channels, max_sample_count);
        self.fill(&mut buffer, Some(loop_end_time));
        buffer
    }

    /// Clear the end-of-loop flag before the next loop iteration.
    pub fn reset_loop_state(&mut self) {
        self.status.set_end_of_loop(false);
    }

    fn fill(&mut self, buffer: &mut FrameBuffer, loop_end: Option<f64>) {
        let tolerance = 1.0 / self.sample_rate.max(1) as f64;

        while !self.is_eof() && !(loop_end.is_some() && self.is_end_of_loop()) {
            let (frame_start, fits) = match self.next_frame() {
                Ok(frame) => (frame.start_timestamp(), buffer.accepts(frame)),
                Err(e) if e.is_eof() => {
                    debug!("Reached end of stream");
                    self.status.set_eof(true);
                    break;
                }
                Err(e) => {
                    error!("Decoding stopped early: {}", e);
                    return;
                }
            };

            if let Some(end) = loop_end {
                if frame_start >= end - tolerance {
                    self.status.set_end_of_loop(true);
                    break;
                }
            }

            if !fits {
                break;
            }

            let Some(mut frame) = self.frame_queue.pop_front() else {
                break;
            };

            if let Some(end) = loop_end {
                if frame.end_timestamp() > end + tolerance {
                    let keep = ((end - frame.start_timestamp()) * self.sample_rate as f64).round();
                    frame.keep_first_n_samples(keep.max(0.0) as usize);
                    self.status.set_end_of_loop(true);
                }
            }

            buffer.push(frame);
        }

        if self.is_eof() && !self.drained {
            let terminal = self.drain_terminal_frames(loop_end);
            buffer.append_terminal_frames(terminal);
        }

        if loop_end.is_some() && self.is_eof() {
            self.status.set_end_of_loop(true);
        }
    }

    fn drain_terminal_frames(&mut self, loop_end: Option<f64>) -> Vec<Frame> {
        self.drained = true;
        let mut terminal: Vec<Frame> = self.frame_queue.drain(..).collect();

        if let Some(pipeline) = self.pipeline.as_mut() {
            match pipeline.codec.drain() {
                Ok(mut frames) => {
                    let start = terminal
                        .last()
                        .map(Frame::end_timestamp)
                        .unwrap_or_default();
                    stamp_frames(&mut frames, start);
                    terminal.extend(frames);
                }
                Err(e) => warn!("Failed to drain codec: {}", e),
            }
        }

        if let Some(end) = loop_end {
            terminal.retain(|frame| frame.start_timestamp() < end);
            if let Some(last) = terminal.last_mut() {
                if last.end_timestamp() > end {
                    let keep = ((end - last.start_timestamp()) * self.sample_rate as f64).round();
                    last.keep_first_n_samples(keep.max(0.0) as usize);
                }
            }
        }

        trace!(frames = terminal.len(), "Drained terminal frames");
        terminal
    }

    /// Head of the pending-frame queue, decoding packets until one is
    /// available. The frame stays queued; callers dequeue after consuming it.
    ///
    /// Corrupt packets are skipped up to the configured consecutive error
    /// limit. Returns [`PlaybackError::EndOfStream`] when the stream ends.
    pub fn next_frame(&mut self) -> Result<&Frame> {
        let mut consecutive_errors = 0;

        while self.frame_queue.is_empty() {
            let pipeline = self.pipeline.as_mut().ok_or(PlaybackError::ContextClosed)?;
            let packet = pipeline.demuxer.read_packet()?;
            let packet_time = pipeline.demuxer.packet_time(&packet);
            self.at_start = false;

            match pipeline.codec.decode(&packet) {
                Ok(mut frames) => {
                    stamp_frames(&mut frames, packet_time);
                    self.frame_queue.extend(frames);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        "Skipping packet with decode error (attempt {}/{}): {}",
                        consecutive_errors, self.max_consecutive_errors, e
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        return Err(PlaybackError::CorruptedStream(format!(
                            "Stream corruption after {} failed packets",
                            consecutive_errors
                        )));
                    }
                }
            }
        }

        self.frame_queue
            .front()
            .ok_or_else(|| PlaybackError::Internal("pending frame queue is empty".to_string()))
    }

    /// Seek to `time`, correcting for demuxer imprecision so the next decoded
    /// sample sits at `time`.
    ///
    /// A target at or past the end of the stream sets the EOF flag and
    /// succeeds. Other demuxer failures are returned.
    #[instrument(skip(self))]
    pub fn seek(&mut self, time: f64) -> Result<()> {
        self.frame_queue.clear();
        self.status.set_eof(false);
        self.status.set_end_of_loop(false);
        self.drained = false;

        let pipeline = self.pipeline.as_mut().ok_or(PlaybackError::ContextClosed)?;
        pipeline.codec.flush();

        match pipeline.demuxer.seek(time) {
            Ok(()) => {}
            Err(e) if e.is_eof() => {
                debug!("Seek target is past the end of the stream");
                self.status.set_eof(true);
                return Ok(());
            }
            Err(e) => {
                error!("Seek failed: {}", e);
                return Err(e);
            }
        }
        self.at_start = time <= 0.0;

        // The demuxer lands on a keyframe at or before the target. Read
        // forward until a packet starts after the target.
        let mut packets: Vec<(Packet, f64)> = Vec::new();
        loop {
            match pipeline.demuxer.read_packet() {
                Ok(packet) => {
                    let packet_time = pipeline.demuxer.packet_time(&packet);
                    packets.push((packet, packet_time));
                    if packet_time > time {
                        break;
                    }
                }
                Err(e) if e.is_eof() => break,
                Err(e) => {
                    warn!("Packet read failed while seeking: {}", e);
                    break;
                }
            }
        }

        if packets.is_empty() {
            self.status.set_eof(true);
            return Ok(());
        }

        let after_target = packets.iter().position(|(_, packet_time)| *packet_time > time);
        let first_usable = after_target.unwrap_or(packets.len()).saturating_sub(1);

        for (packet, _) in &packets[..first_usable] {
            if let Err(e) = pipeline.codec.decode_and_drop(packet) {
                debug!("Ignoring error while priming codec: {}", e);
            }
        }

        let mut usable: Vec<Vec<Frame>> = Vec::with_capacity(packets.len() - first_usable);
        for (packet, packet_time) in &packets[first_usable..] {
            match pipeline.codec.decode(packet) {
                Ok(mut frames) => {
                    stamp_frames(&mut frames, *packet_time);
                    usable.push(frames);
                }
                Err(e) => {
                    warn!("Skipping undecodable packet after seek: {}", e);
                    usable.push(Vec::new());
                }
            }
        }

        let usable_time = packets[first_usable].1;
        if time - usable_time > self.seek_tolerance {
            let has_next = usable.len() > 1;
            if let Some(first) = usable.first_mut() {
                match after_target {
                    // Keep only the part of the usable packet that lies
                    // between the target and the next packet
                    Some(index) if has_next => {
                        let next_time = packets[index].1;
                        let keep = ((next_time - time) * self.sample_rate as f64).round();
                        keep_last_samples_of_packet(first, keep.max(0.0) as usize);
                    }
                    // The stream ends inside the usable packet
                    None => {
                        let total: usize = first.iter().map(Frame::sample_count).sum();
                        let skip = ((time - usable_time) * self.sample_rate as f64).round() as usize;
                        keep_last_samples_of_packet(first, total.saturating_sub(skip));
                    }
                    Some(_) => {}
                }
            }
        }

        self.frame_queue.extend(usable.into_iter().flatten());
        debug!(
            pending = self.frame_queue.len(),
            "Seek corrected to {:.3}s", time
        );
        Ok(())
    }

    /// Discard pending frames, e.g. when scheduling is cancelled.
    pub fn stop(&mut self) {
        self.frame_queue.clear();
    }

    /// Release the codec and demuxer. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.pipeline.take().is_some() {
            debug!("Destroyed generic decoder");
        }
        self.frame_queue.clear();
    }

    /// Returns `true` once [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.pipeline.is_none()
    }
}

impl Drop for GenericDecoder {
    fn drop(&mut self) {
        self.destroy();
    }
}
