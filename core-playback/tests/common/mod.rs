//! Shared fixtures for the core-playback integration tests.

#![allow(dead_code)]

use core_playback::decoder::{Frame, OpenedStream, StreamOpener};
use core_playback::scheduling::PlaybackSegment;
use core_playback::traits::{
    AudioCodec, AudioFormat, Codec, CompletionHandler, Demuxer, OutputNode, Packet, SampleFormat,
};
use core_playback::{PcmBuffer, PlaybackError, PlaybackSession, Result};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Files
// ============================================================================

/// Write a mono 16-bit WAV of `frames` frames at `sample_rate`.
pub fn write_wav(dir: &Path, name: &str, sample_rate: u32, frames: usize) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample((i % 100) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

// ============================================================================
// Recording output node
// ============================================================================

/// What a scheduler handed to the output node.
#[derive(Debug, Clone, PartialEq)]
pub enum Scheduled {
    Segment {
        first_frame: i64,
        last_frame: i64,
        start_time: f64,
        end_time: f64,
        immediate: bool,
    },
    Buffer {
        frames: usize,
        first_sample: Option<f32>,
        start_time: Option<f64>,
        immediate: bool,
    },
}

impl Scheduled {
    pub fn is_immediate(&self) -> bool {
        match self {
            Scheduled::Segment { immediate, .. } | Scheduled::Buffer { immediate, .. } => *immediate,
        }
    }
}

/// Output node that records what it is given and completes buffers only
/// when the test says so.
///
/// `stop` moves pending completions to a separate list instead of running
/// them, so tests can deliver them late.
#[derive(Default)]
pub struct RecordingOutput {
    scheduled: Mutex<Vec<Scheduled>>,
    pending: Mutex<VecDeque<(PlaybackSession, CompletionHandler)>>,
    flushed: Mutex<Vec<(PlaybackSession, CompletionHandler)>>,
    position: Mutex<f64>,
    parked_at_end: Mutex<Option<f64>>,
    playing: AtomicBool,
    plays: AtomicUsize,
    stops: AtomicUsize,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

/// Holds the next deferred schedule inside the output node until released.
pub struct DeferredGate {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl DeferredGate {
    /// Block until a deferred schedule is waiting at the gate.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("no deferred schedule reached the gate");
    }

    pub fn release(&self) {
        self.release.send(()).unwrap();
    }
}

impl RecordingOutput {
    pub fn scheduled(&self) -> Vec<Scheduled> {
        self.scheduled.lock().clone()
    }

    pub fn clear_scheduled(&self) {
        self.scheduled.lock().clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn set_position(&self, seconds: f64) {
        *self.position.lock() = seconds;
    }

    pub fn parked_at_end(&self) -> Option<f64> {
        *self.parked_at_end.lock()
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    /// Make the next non-immediate schedule wait until the returned gate is
    /// released.
    pub fn hold_next_deferred(&self) -> DeferredGate {
        let (entered_tx, entered) = crossbeam_channel::bounded(1);
        let (release, release_rx) = crossbeam_channel::bounded(1);
        *self.gate.lock() = Some((entered_tx, release_rx));
        DeferredGate { entered, release }
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Complete the oldest scheduled buffer. Returns `false` if none is
    /// pending.
    pub fn complete_next(&self) -> bool {
        let next = self.pending.lock().pop_front();
        match next {
            Some((session, completion)) => {
                completion(session);
                true
            }
            None => false,
        }
    }

    /// Deliver the completions of buffers flushed by `stop`.
    pub fn complete_flushed(&self) -> usize {
        let flushed: Vec<_> = self.flushed.lock().drain(..).collect();
        let count = flushed.len();
        for (session, completion) in flushed {
            completion(session);
        }
        count
    }

    fn record(&self, scheduled: Scheduled, session: &PlaybackSession, completion: CompletionHandler) {
        if !scheduled.is_immediate() {
            let gate = self.gate.lock().take();
            if let Some((entered, release)) = gate {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
        }
        self.scheduled.lock().push(scheduled);
        self.pending.lock().push_back((session.clone(), completion));
    }
}

impl OutputNode for RecordingOutput {
    fn play(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
        let drained: Vec<_> = self.pending.lock().drain(..).collect();
        self.flushed.lock().extend(drained);
    }

    fn reset(&self) {
        self.stop();
        *self.position.lock() = 0.0;
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn reconnect(&self, _format: &AudioFormat) {}

    fn schedule_buffer(
        &self,
        buffer: PcmBuffer,
        session: &PlaybackSession,
        completion: CompletionHandler,
        start_time: Option<f64>,
        immediate_playback: bool,
    ) {
        let scheduled = Scheduled::Buffer {
            frames: buffer.frame_count(),
            first_sample: buffer.samples().first().copied(),
            start_time,
            immediate: immediate_playback,
        };
        self.record(scheduled, session, completion);
    }

    fn schedule_segment(
        &self,
        segment: PlaybackSegment,
        completion: CompletionHandler,
        immediate_playback: bool,
    ) {
        let scheduled = Scheduled::Segment {
            first_frame: segment.first_frame,
            last_frame: segment.last_frame,
            start_time: segment.start_time,
            end_time: segment.end_time,
            immediate: immediate_playback,
        };
        let session = segment.session.clone();
        self.record(scheduled, &session, completion);
    }

    fn seek_position(&self) -> f64 {
        *self.position.lock()
    }

    fn seek_to_end_of_track(&self, session: &PlaybackSession) {
        *self.parked_at_end.lock() = Some(session.track().duration());
    }
}

// ============================================================================
// Synthetic packet stream
// ============================================================================

/// Layout of a synthetic stream: `packet_count` packets of
/// `samples_per_packet` mono samples at `sample_rate`. Every sample holds
/// its own timestamp in seconds, so tests can read positions off the audio.
#[derive(Debug, Clone)]
pub struct StreamLayout {
    pub sample_rate: u32,
    pub samples_per_packet: usize,
    pub packet_count: usize,
    /// Seek lands on every n-th packet.
    pub keyframe_interval: usize,
    /// Packet indices the codec refuses to decode.
    pub corrupt_packets: HashSet<usize>,
    /// The container reports neither a duration nor a frame count.
    pub unknown_duration: bool,
}

impl StreamLayout {
    /// Four packets of half a second at 1 kHz.
    pub fn half_second_packets() -> Self {
        Self {
            sample_rate: 1000,
            samples_per_packet: 500,
            packet_count: 4,
            keyframe_interval: 1,
            corrupt_packets: HashSet::new(),
            unknown_duration: false,
        }
    }

    pub fn with_unknown_duration(mut self) -> Self {
        self.unknown_duration = true;
        self
    }

    pub fn with_keyframe_interval(mut self, interval: usize) -> Self {
        self.keyframe_interval = interval.max(1);
        self
    }

    pub fn with_corrupt_packets(mut self, packets: &[usize]) -> Self {
        self.corrupt_packets = packets.iter().copied().collect();
        self
    }

    pub fn packet_seconds(&self) -> f64 {
        self.samples_per_packet as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> f64 {
        self.packet_seconds() * self.packet_count as f64
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(
            AudioCodec::Other("synthetic".to_string()),
            self.sample_rate,
            1,
            None,
        )
    }
}

pub struct SyntheticDemuxer {
    layout: StreamLayout,
    next_packet: usize,
}

impl Demuxer for SyntheticDemuxer {
    fn time_base(&self) -> f64 {
        self.layout.packet_seconds()
    }

    fn duration(&self) -> f64 {
        if self.layout.unknown_duration {
            return 0.0;
        }
        self.layout.duration()
    }

    fn read_packet(&mut self) -> Result<Packet> {
        if self.next_packet >= self.layout.packet_count {
            return Err(PlaybackError::EndOfStream);
        }
        let index = self.next_packet;
        self.next_packet += 1;
        Ok(Packet {
            pts: index as i64,
            duration: 1,
            data: bytes::Bytes::from(vec![index as u8]),
        })
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        if time >= self.layout.duration() {
            return Err(PlaybackError::EndOfStream);
        }
        let packet = (time.max(0.0) / self.layout.packet_seconds()).floor() as usize;
        self.next_packet = packet - packet % self.layout.keyframe_interval;
        Ok(())
    }
}

pub struct SyntheticCodec {
    layout: StreamLayout,
    primed: Arc<AtomicUsize>,
}

impl Codec for SyntheticCodec {
    fn sample_rate(&self) -> u32 {
        self.layout.sample_rate
    }

    fn channels(&self) -> u16 {
        1
    }

    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        let index = packet.pts as usize;
        if self.layout.corrupt_packets.contains(&index) {
            return Err(PlaybackError::DecodingError(format!("packet {} is corrupt", index)));
        }
        let first = index * self.layout.samples_per_packet;
        let samples = (first..first + self.layout.samples_per_packet)
            .map(|sample| sample as f32 / self.layout.sample_rate as f32)
            .collect();
        Ok(vec![Frame::new(
            samples,
            1,
            self.layout.sample_rate,
            packet.pts,
            SampleFormat::F32,
        )])
    }

    fn decode_and_drop(&mut self, packet: &Packet) -> Result<()> {
        self.primed.fetch_add(1, Ordering::SeqCst);
        self.decode(packet).map(|_| ())
    }

    fn drain(&mut self) -> Result<Vec<Frame>> {
        Ok(Vec::new())
    }

    fn flush(&mut self) {}
}

/// Opens synthetic streams and counts how often it was asked to.
pub struct SyntheticOpener {
    pub layout: StreamLayout,
    pub opened: Arc<AtomicUsize>,
    pub primed: Arc<AtomicUsize>,
}

impl SyntheticOpener {
    pub fn new(layout: StreamLayout) -> Self {
        Self {
            layout,
            opened: Arc::new(AtomicUsize::new(0)),
            primed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn stream(&self) -> OpenedStream {
        OpenedStream {
            demuxer: Box::new(SyntheticDemuxer {
                layout: self.layout.clone(),
                next_packet: 0,
            }),
            codec: Box::new(SyntheticCodec {
                layout: self.layout.clone(),
                primed: Arc::clone(&self.primed),
            }),
            format: self.layout.format(),
            frame_count: if self.layout.unknown_duration {
                0
            } else {
                (self.layout.samples_per_packet * self.layout.packet_count) as u64
            },
        }
    }
}

impl StreamOpener for SyntheticOpener {
    fn open_stream(&self) -> Result<OpenedStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.stream())
    }
}
