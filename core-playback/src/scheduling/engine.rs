//! The scheduling state machine shared by both backends.
//!
//! A backend only decides how a chunk of audio is produced
//! ([`ChunkSource`]); the two-phase scheduling, completion chaining,
//! in-flight accounting and stale-session filtering live here.

use super::counter::{BufferCounter, SessionCounters};
use super::queue::SerialQueue;
use super::{PlaybackSegment, SchedulerEvent};
use crate::config::SchedulingConfig;
use crate::error::Result;
use crate::output::PcmBuffer;
use crate::session::{PlaybackSession, SessionRegistry};
use crate::traits::{CompletionHandler, OutputNode, Scheduler};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, instrument, trace, warn};

/// How far a playback run may decode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// To the end of the track.
    Track,
    /// To the end of the session's loop.
    Loop {
        /// Loop end in seconds.
        end_time: f64,
    },
}

/// Where a source ended up after positioning for a new run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// Audio is available from the requested position.
    Positioned,
    /// The requested position is at or past the end of the track.
    EndOfTrack,
}

/// One schedulable unit of audio.
pub enum Chunk {
    /// Decoded samples starting at `start_time` seconds.
    Buffer { buffer: PcmBuffer, start_time: f64 },
    /// A frame range of a native file.
    Segment(PlaybackSegment),
}

/// Produces chunks of audio for one backend.
///
/// Calls for a session are serialized by the scheduler: the controlling
/// thread only touches the source while no deferred task is running.
pub trait ChunkSource: Send + Sync + 'static {
    /// Position the source at `start_time` for a new run.
    fn begin(&self, session: &PlaybackSession, start_time: f64, bound: Bound) -> Result<SeekOutcome>;

    /// Produce the next chunk, sized for immediate or deferred playback.
    /// `None` once the bound is reached.
    fn next_chunk(&self, session: &PlaybackSession, immediate: bool, bound: Bound) -> Option<Chunk>;

    /// Returns `true` once everything up to the bound has been produced.
    fn is_exhausted(&self, session: &PlaybackSession, bound: Bound) -> bool;

    /// Clear end-of-loop state before a loop restarts or ends.
    fn reset_loop_state(&self, session: &PlaybackSession);

    /// Discard anything produced but not yet handed out.
    fn stop(&self);
}

struct Core<S: ChunkSource> {
    backend: &'static str,
    output: Arc<dyn OutputNode>,
    registry: Arc<SessionRegistry>,
    control: Sender<SchedulerEvent>,
    queue: SerialQueue,
    counters: SessionCounters,
    completed_while_paused: AtomicBool,
    source: S,
}

/// [`Scheduler`] implementation over a [`ChunkSource`].
pub struct BufferScheduler<S: ChunkSource> {
    core: Arc<Core<S>>,
}

impl<S: ChunkSource> BufferScheduler<S> {
    pub(crate) fn with_source(
        backend: &'static str,
        source: S,
        output: Arc<dyn OutputNode>,
        registry: Arc<SessionRegistry>,
        control: Sender<SchedulerEvent>,
        config: &SchedulingConfig,
    ) -> Result<Self> {
        let queue = SerialQueue::new(&format!("{}-{}", config.scheduler_thread_name, backend))?;
        Ok(Self {
            core: Arc::new(Core {
                backend,
                output,
                registry,
                control,
                queue,
                counters: SessionCounters::default(),
                completed_while_paused: AtomicBool::new(false),
                source,
            }),
        })
    }

    /// Block until every queued deferred task has run.
    pub fn wait_for_scheduling(&self) {
        self.core.queue.wait_until_idle();
    }

    /// Buffers of `session` handed to the output node and not yet completed.
    pub fn in_flight_buffers(&self, session: &PlaybackSession) -> i64 {
        self.core.counters.value(session)
    }

    fn complete_loop_bounds(&self, session: &PlaybackSession) -> Option<(f64, f64)> {
        let playback_loop = session.playback_loop()?;
        playback_loop
            .end_time
            .map(|end_time| (playback_loop.start_time, end_time))
    }
}

impl<S: ChunkSource> Core<S> {
    #[instrument(skip(self, session), fields(backend = self.backend, session = %session.id()))]
    fn start_playback(
        self: &Arc<Self>,
        session: &PlaybackSession,
        start_time: f64,
        bound: Bound,
        begin_playback: bool,
    ) {
        self.stop_scheduling();
        self.completed_while_paused.store(false, Ordering::Release);
        self.counters.reset(session);

        match self.source.begin(session, start_time, bound) {
            Ok(SeekOutcome::Positioned) => {}
            Ok(SeekOutcome::EndOfTrack) => {
                if begin_playback {
                    self.send_event(completion_event(session, bound));
                } else {
                    self.output.seek_to_end_of_track(session);
                    self.completed_while_paused.store(true, Ordering::Release);
                }
                return;
            }
            Err(e) => {
                error!(
                    track = session.track().id(),
                    "Cannot start scheduling at {:.3}s: {}", start_time, e
                );
                return;
            }
        }

        if !self.schedule_one(session, true, bound) {
            warn!(
                track = session.track().id(),
                "No buffers scheduled, cannot begin playback"
            );
            return;
        }
        self.schedule_deferred(session, bound);

        if begin_playback {
            self.output.play();
        }
    }

    /// Produce one chunk and hand it to the output node. Returns `false` if
    /// nothing was scheduled.
    fn schedule_one(self: &Arc<Self>, session: &PlaybackSession, immediate: bool, bound: Bound) -> bool {
        if !self.registry.is_current(session) {
            trace!(session = %session.id(), "Not scheduling for stale session");
            return false;
        }

        let Some(counter) = self.counters.get(session) else {
            warn!(session = %session.id(), "Scheduling buffer for an untracked session");
            return false;
        };
        let Some(chunk) = self.source.next_chunk(session, immediate, bound) else {
            return false;
        };

        // Counted before the output node can possibly complete it
        counter.increment();
        let completion = self.completion_handler(counter, bound);

        match chunk {
            Chunk::Buffer { buffer, start_time } => {
                trace!(frames = buffer.frame_count(), start_time, immediate, "Scheduling buffer");
                self.output
                    .schedule_buffer(buffer, session, completion, Some(start_time), immediate);
            }
            Chunk::Segment(segment) => {
                trace!(
                    first_frame = segment.first_frame,
                    frames = segment.frame_count,
                    immediate,
                    "Scheduling segment"
                );
                self.output.schedule_segment(segment, completion, immediate);
            }
        }
        true
    }

    fn schedule_deferred(self: &Arc<Self>, session: &PlaybackSession, bound: Bound) {
        if self.source.is_exhausted(session, bound) {
            return;
        }

        let core = Arc::downgrade(self);
        let session = session.clone();
        self.queue.submit(move || {
            if let Some(core) = core.upgrade() {
                core.run_deferred(&session, bound);
            }
        });
    }

    fn run_deferred(self: &Arc<Self>, session: &PlaybackSession, bound: Bound) {
        if !self.registry.is_current(session) || self.schedule_one(session, false, bound) {
            return;
        }

        // Nothing left to schedule; the run is over once nothing is in flight
        let Some(counter) = self.counters.get(session) else {
            return;
        };
        if counter.value() == 0 {
            if !self.source.is_exhausted(session, bound) {
                warn!(
                    track = session.track().id(),
                    "Decoding produced no audio before the end of the stream"
                );
            }
            self.signal_completion(session, &counter, bound);
        }
    }

    fn completion_handler(self: &Arc<Self>, counter: Arc<BufferCounter>, bound: Bound) -> CompletionHandler {
        let core: Weak<Self> = Arc::downgrade(self);
        Box::new(move |session| {
            if let Some(core) = core.upgrade() {
                core.buffer_completed(&session, &counter, bound);
            }
        })
    }

    fn buffer_completed(self: &Arc<Self>, session: &PlaybackSession, counter: &Arc<BufferCounter>, bound: Bound) {
        if !self.registry.is_current(session) {
            trace!(session = %session.id(), "Ignoring completion of stale session");
            return;
        }
        // A restart of the same session flushes the previous run's buffers
        if !self.counters.is_active(session, counter) {
            trace!(session = %session.id(), "Ignoring completion of a cancelled run");
            return;
        }
        let Some(remaining) = counter.decrement() else {
            warn!(session = %session.id(), "Buffer completed with nothing in flight");
            return;
        };

        if !self.source.is_exhausted(session, bound) {
            self.schedule_deferred(session, bound);
        } else if remaining == 0 {
            self.signal_completion(session, counter, bound);
        }
    }

    fn signal_completion(&self, session: &PlaybackSession, counter: &BufferCounter, bound: Bound) {
        if !counter.claim_completion() {
            return;
        }
        debug!(backend = self.backend, session = %session.id(), ?bound, "Playback run completed");
        self.send_event(completion_event(session, bound));
    }

    fn send_event(&self, event: SchedulerEvent) {
        if self.control.send(event).is_err() {
            warn!("Control channel closed, dropping scheduler event");
        }
    }

    fn stop_scheduling(&self) {
        self.queue.cancel_all();
        self.queue.wait_until_idle();
        self.output.stop();
        self.source.stop();
        self.counters.clear();
    }
}

fn completion_event(session: &PlaybackSession, bound: Bound) -> SchedulerEvent {
    match bound {
        Bound::Track => SchedulerEvent::TrackCompleted(session.clone()),
        Bound::Loop { .. } => SchedulerEvent::LoopCompleted(session.clone()),
    }
}

impl<S: ChunkSource> Scheduler for BufferScheduler<S> {
    fn play_track(&self, session: &PlaybackSession, start_position: f64) {
        self.core
            .start_playback(session, start_position.max(0.0), Bound::Track, true);
    }

    fn play_loop(&self, session: &PlaybackSession, begin_playback: bool) {
        match self.complete_loop_bounds(session) {
            Some((start_time, _)) => self.play_loop_from(session, start_time, begin_playback),
            None => warn!(session = %session.id(), "Session has no complete loop to play"),
        }
    }

    fn play_loop_from(&self, session: &PlaybackSession, start_time: f64, begin_playback: bool) {
        let Some((loop_start, loop_end)) = self.complete_loop_bounds(session) else {
            warn!(session = %session.id(), "Session has no complete loop to play");
            return;
        };
        let start_time = start_time.clamp(loop_start, loop_end);
        self.core.start_playback(
            session,
            start_time,
            Bound::Loop { end_time: loop_end },
            begin_playback,
        );
    }

    fn seek_to_time(&self, session: &PlaybackSession, seconds: f64, begin_playback: bool) {
        if self.complete_loop_bounds(session).is_some() {
            self.play_loop_from(session, seconds, begin_playback);
            return;
        }
        self.core
            .start_playback(session, seconds.max(0.0), Bound::Track, begin_playback);
    }

    fn end_loop(&self, session: &PlaybackSession, loop_end_time: f64, begin_playback: bool) {
        let position = self.core.output.seek_position().min(loop_end_time);
        self.core.stop_scheduling();
        self.core.source.reset_loop_state(session);
        debug!(position, "Leaving loop");
        self.core
            .start_playback(session, position, Bound::Track, begin_playback);
    }

    fn loop_completed(&self, session: &PlaybackSession) {
        if !self.core.registry.is_current(session) {
            trace!(session = %session.id(), "Ignoring loop completion of stale session");
            return;
        }
        let Some((loop_start, loop_end)) = self.complete_loop_bounds(session) else {
            return;
        };

        self.core.source.reset_loop_state(session);
        debug!(loop_start, loop_end, "Restarting loop");
        self.core.start_playback(
            session,
            loop_start,
            Bound::Loop { end_time: loop_end },
            true,
        );
    }

    fn pause(&self) {
        self.core.output.pause();
    }

    fn resume(&self) {
        if self.core.completed_while_paused.swap(false, Ordering::AcqRel) {
            if let Some(session) = self.core.registry.current() {
                let bound = match session.playback_loop().and_then(|l| l.end_time) {
                    Some(end_time) => Bound::Loop { end_time },
                    None => Bound::Track,
                };
                debug!("Track ended while paused, signalling completion");
                self.core.send_event(completion_event(&session, bound));
                return;
            }
        }
        self.core.output.play();
    }

    fn stop(&self) {
        self.core.stop_scheduling();
        self.core.completed_while_paused.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Track;
    use crate::traits::AudioFormat;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Hands out `total` short buffers per run.
    struct CountedSource {
        total: usize,
        produced: Mutex<usize>,
    }

    impl ChunkSource for CountedSource {
        fn begin(&self, _session: &PlaybackSession, _start_time: f64, _bound: Bound) -> Result<SeekOutcome> {
            *self.produced.lock() = 0;
            Ok(SeekOutcome::Positioned)
        }

        fn next_chunk(&self, _session: &PlaybackSession, _immediate: bool, _bound: Bound) -> Option<Chunk> {
            let mut produced = self.produced.lock();
            if *produced >= self.total {
                return None;
            }
            let start_time = *produced as f64 * 0.01;
            *produced += 1;
            Some(Chunk::Buffer {
                buffer: PcmBuffer::silence(10, 1, 1000),
                start_time,
            })
        }

        fn is_exhausted(&self, _session: &PlaybackSession, _bound: Bound) -> bool {
            *self.produced.lock() >= self.total
        }

        fn reset_loop_state(&self, _session: &PlaybackSession) {}

        fn stop(&self) {}
    }

    #[derive(Default)]
    struct QueueOutput {
        pending: Mutex<VecDeque<(PlaybackSession, CompletionHandler)>>,
        plays: AtomicUsize,
    }

    impl QueueOutput {
        fn complete_next(&self) -> bool {
            let next = self.pending.lock().pop_front();
            match next {
                Some((session, completion)) => {
                    completion(session);
                    true
                }
                None => false,
            }
        }
    }

    impl OutputNode for QueueOutput {
        fn play(&self) {
            self.plays.fetch_add(1, Ordering::SeqCst);
        }
        fn pause(&self) {}
        fn stop(&self) {
            self.pending.lock().clear();
        }
        fn reset(&self) {
            self.stop();
        }
        fn is_playing(&self) -> bool {
            false
        }
        fn reconnect(&self, _format: &AudioFormat) {}
        fn schedule_buffer(
            &self,
            _buffer: PcmBuffer,
            session: &PlaybackSession,
            completion: CompletionHandler,
            _start_time: Option<f64>,
            _immediate_playback: bool,
        ) {
            self.pending.lock().push_back((session.clone(), completion));
        }
        fn schedule_segment(
            &self,
            segment: PlaybackSegment,
            completion: CompletionHandler,
            _immediate_playback: bool,
        ) {
            self.pending.lock().push_back((segment.session.clone(), completion));
        }
        fn seek_position(&self) -> f64 {
            0.0
        }
        fn seek_to_end_of_track(&self, _session: &PlaybackSession) {}
    }

    #[test]
    fn test_extra_completion_of_a_finished_run_is_ignored() {
        let output = Arc::new(QueueOutput::default());
        let registry = Arc::new(SessionRegistry::new());
        let (sender, control) = crossbeam_channel::unbounded();
        let source = CountedSource {
            total: 3,
            produced: Mutex::new(0),
        };
        let scheduler = BufferScheduler::with_source(
            "counted",
            source,
            output.clone(),
            Arc::clone(&registry),
            sender,
            &SchedulingConfig::default(),
        )
        .unwrap();
        let track = Arc::new(Track::new("track-1", "Tone", "/tone.wav", 0.03));
        let session = registry.start(track, None);

        scheduler.play_track(&session, 0.0);
        let mut completed = 0;
        loop {
            scheduler.wait_for_scheduling();
            if !output.complete_next() {
                break;
            }
            completed += 1;
        }
        assert_eq!(completed, 3);
        assert_eq!(control.try_iter().count(), 1);

        // One completion more than was scheduled for the same run
        let counter = scheduler.core.counters.get(&session).unwrap();
        let extra = scheduler.core.completion_handler(Arc::clone(&counter), Bound::Track);
        extra(session.clone());
        scheduler.wait_for_scheduling();

        assert_eq!(counter.value(), 0);
        assert_eq!(scheduler.in_flight_buffers(&session), 0);
        assert_eq!(control.try_iter().count(), 0);
        assert_eq!(output.plays.load(Ordering::SeqCst), 1);
    }
}
