//! Pull-driven output node.

use super::PcmBuffer;
use crate::config::SchedulingConfig;
use crate::error::Result;
use crate::scheduling::PlaybackSegment;
use crate::session::PlaybackSession;
use crate::time::{frame_for_time, time_for_frame};
use crate::traits::{AudioContext, AudioFormat, CompletionHandler, OutputNode};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

struct QueuedBuffer {
    buffer: PcmBuffer,
    position: usize,
    session: PlaybackSession,
    completion: CompletionHandler,
}

struct PendingCompletion {
    session: PlaybackSession,
    completion: CompletionHandler,
}

struct NodeState {
    format: AudioFormat,
    queue: VecDeque<QueuedBuffer>,
    /// Frames rendered since the last stop.
    sample_time: i64,
    /// Track frame at which the current immediate buffer starts.
    start_frame: i64,
    /// Render clock offset captured when playback begins for a segment.
    frames_correction: i64,
    correction_pending: bool,
    clock_running: bool,
    cached_seek_position: f64,
}

impl NodeState {
    fn new(format: AudioFormat) -> Self {
        Self {
            format,
            queue: VecDeque::new(),
            sample_time: 0,
            start_frame: 0,
            frames_correction: 0,
            correction_pending: false,
            clock_running: false,
            cached_seek_position: 0.0,
        }
    }

    fn mark_immediate(&mut self, start_frame: i64, start_time: f64) {
        self.start_frame = start_frame;
        self.cached_seek_position = start_time;
        self.correction_pending = true;
    }
}

/// Output node rendering scheduled buffers on demand.
///
/// Position is derived from the number of frames rendered since the last
/// immediate buffer, relative to that buffer's start frame.
pub struct PlayerNode {
    state: Mutex<NodeState>,
    playing: AtomicBool,
    completions: Option<Sender<PendingCompletion>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl PlayerNode {
    /// Create a node for CD-quality output.
    pub fn new(config: &SchedulingConfig) -> Result<Self> {
        Self::with_format(AudioFormat::cd_quality(), config)
    }

    /// Create a node connected with `format`.
    pub fn with_format(format: AudioFormat, config: &SchedulingConfig) -> Result<Self> {
        let (sender, receiver) = unbounded::<PendingCompletion>();
        let dispatcher = thread::Builder::new()
            .name(config.completion_thread_name.clone())
            .spawn(move || {
                for pending in receiver {
                    (pending.completion)(pending.session);
                }
                trace!("Completion dispatcher exiting");
            })?;

        Ok(Self {
            state: Mutex::new(NodeState::new(format)),
            playing: AtomicBool::new(false),
            completions: Some(sender),
            dispatcher: Some(dispatcher),
        })
    }

    /// Format the node is currently connected with.
    pub fn format(&self) -> AudioFormat {
        self.state.lock().format.clone()
    }

    /// Number of buffers scheduled and not yet finished.
    pub fn queued_buffers(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Fill `out` (interleaved, in the connected channel layout) with the
    /// next frames of scheduled audio, padding with silence. Returns the
    /// number of audio frames rendered.
    pub fn render(&self, out: &mut [f32]) -> usize {
        let mut finished = Vec::new();

        let rendered = {
            let mut state = self.state.lock();
            let channels = state.format.channels.max(1) as usize;
            let wanted = out.len() / channels;
            let mut written = 0;

            if self.playing.load(Ordering::Acquire) {
                while written < wanted {
                    let Some(head) = state.queue.front_mut() else {
                        break;
                    };

                    let available = head.buffer.frame_count() - head.position;
                    let count = available.min(wanted - written);
                    for frame in 0..count {
                        for channel in 0..channels {
                            out[(written + frame) * channels + channel] =
                                head.buffer.sample(head.position + frame, channel);
                        }
                    }
                    head.position += count;
                    written += count;

                    if head.position >= head.buffer.frame_count() {
                        if let Some(done) = state.queue.pop_front() {
                            finished.push(done);
                        }
                    }
                }
                state.sample_time += written as i64;
            }

            out[written * channels..].fill(0.0);
            written
        };

        for done in finished {
            self.dispatch(done);
        }
        rendered
    }

    fn dispatch(&self, done: QueuedBuffer) {
        let pending = PendingCompletion {
            session: done.session,
            completion: done.completion,
        };
        match &self.completions {
            Some(sender) => {
                if sender.send(pending).is_err() {
                    warn!("Completion dispatcher is gone, dropping completion");
                }
            }
            None => warn!("Output node is shutting down, dropping completion"),
        }
    }

    fn flush(&self) {
        let flushed: Vec<QueuedBuffer> = {
            let mut state = self.state.lock();
            state.sample_time = 0;
            state.frames_correction = 0;
            state.clock_running = false;
            state.queue.drain(..).collect()
        };
        if !flushed.is_empty() {
            debug!(count = flushed.len(), "Flushed scheduled buffers");
        }
        for done in flushed {
            self.dispatch(done);
        }
    }

    fn enqueue(&self, buffer: PcmBuffer, session: &PlaybackSession, completion: CompletionHandler) {
        self.state.lock().queue.push_back(QueuedBuffer {
            buffer,
            position: 0,
            session: session.clone(),
            completion,
        });
    }
}

impl OutputNode for PlayerNode {
    fn play(&self) {
        let mut state = self.state.lock();
        if state.correction_pending {
            state.frames_correction = state.sample_time;
            state.correction_pending = false;
        }
        state.clock_running = true;
        self.playing.store(true, Ordering::Release);
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::Release);
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::Release);
        self.flush();
    }

    fn reset(&self) {
        self.stop();
        let mut state = self.state.lock();
        state.start_frame = 0;
        state.cached_seek_position = 0.0;
        state.correction_pending = false;
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn reconnect(&self, format: &AudioFormat) {
        let mut state = self.state.lock();
        if !state.format.same_layout(format) {
            debug!(
                sample_rate = format.sample_rate,
                channels = format.channels,
                "Reconnecting output"
            );
        }
        state.format = format.clone();
    }

    fn schedule_buffer(
        &self,
        buffer: PcmBuffer,
        session: &PlaybackSession,
        completion: CompletionHandler,
        start_time: Option<f64>,
        immediate_playback: bool,
    ) {
        if immediate_playback {
            let mut state = self.state.lock();
            match start_time {
                Some(time) => {
                    let frame = frame_for_time(time, state.format.sample_rate as f64);
                    state.mark_immediate(frame, time);
                }
                None => state.correction_pending = true,
            }
        }
        self.enqueue(buffer, session, completion);
    }

    fn schedule_segment(
        &self,
        segment: PlaybackSegment,
        completion: CompletionHandler,
        immediate_playback: bool,
    ) {
        let buffer = match segment.read_buffer() {
            Ok(buffer) => buffer,
            Err(e) => {
                error!(
                    first_frame = segment.first_frame,
                    "Failed to read segment: {}", e
                );
                // Completes without audio so the in-flight count still drains
                PcmBuffer::silence(0, segment.file.audio_format().channels, segment.file.sample_rate())
            }
        };

        if immediate_playback {
            self.state
                .lock()
                .mark_immediate(segment.first_frame, segment.start_time);
        }
        self.enqueue(buffer, &segment.session, completion);
    }

    fn seek_position(&self) -> f64 {
        let mut state = self.state.lock();
        let sample_rate = state.format.sample_rate as f64;
        if !state.clock_running || sample_rate <= 0.0 {
            return state.cached_seek_position;
        }

        let frame = state.start_frame + state.sample_time - state.frames_correction;
        let position = time_for_frame(frame, sample_rate);
        if position.is_finite() && position >= 0.0 {
            state.cached_seek_position = position;
            position
        } else {
            state.cached_seek_position
        }
    }

    fn seek_to_end_of_track(&self, session: &PlaybackSession) {
        let track = session.track();
        let mut state = self.state.lock();
        let frame_count = track
            .playback_context()
            .map(|context| context.frame_count() as i64)
            .unwrap_or_else(|| frame_for_time(track.duration(), state.format.sample_rate as f64));

        state.start_frame = frame_count;
        state.cached_seek_position = track.duration();
        state.sample_time = 0;
        state.frames_correction = 0;
        state.correction_pending = false;
        state.clock_running = false;
    }
}

impl Drop for PlayerNode {
    fn drop(&mut self) {
        // Closing the channel ends the dispatcher loop
        self.completions.take();
        if let Some(handle) = self.dispatcher.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("Completion dispatcher panicked");
            }
        }
    }
}
