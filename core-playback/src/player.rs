//! # Player
//!
//! Top-level playback state machine. Owns the session registry, picks the
//! scheduler backend per track and translates transport commands (play,
//! seek, loop toggling, device changes) into scheduler calls on fresh
//! sessions.
//!
//! The player is driven from one controlling thread. Scheduler completions
//! arrive on a control channel and take effect when that thread calls
//! [`Player::process_events`] or [`Player::wait_for_events`].

use crate::config::SchedulingConfig;
use crate::error::{PlaybackError, Result};
use crate::scheduling::{GenericScheduler, NativeScheduler, SchedulerEvent};
use crate::session::{PlaybackLoop, PlaybackSession, SessionRegistry};
use crate::track::Track;
use crate::traits::{AudioContext, OutputNode, Scheduler};
use chrono::{DateTime, Utc};
use core_runtime::config::RuntimeConfig;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Transport state of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No track is loaded.
    #[default]
    NoTrack,
    /// A track is loaded and rendering.
    Playing,
    /// A track is loaded and paused.
    Paused,
}

impl PlaybackState {
    /// Returns `true` if a track is loaded.
    pub fn is_playing_or_paused(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

/// Outcome of a seek request.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SeekResult {
    /// Position playback continues from, after loop and track clamping.
    pub actual_seek_position: f64,
    /// The seek left the loop's bounds and removed it.
    pub loop_removed: bool,
    /// The seek reached the end of the track while playing; nothing was
    /// scheduled and the caller should move on to the next track.
    pub track_playback_completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Native,
    Generic,
}

/// The playback engine's public surface.
pub struct Player {
    output: Arc<dyn OutputNode>,
    registry: Arc<SessionRegistry>,
    native: Arc<dyn Scheduler>,
    generic: Arc<dyn Scheduler>,
    backend: Mutex<Backend>,
    state: Mutex<PlaybackState>,
    control: Receiver<SchedulerEvent>,
    events: Option<EventBus>,
}

impl Player {
    /// Create a player with a native and a generic scheduler feeding `output`.
    pub fn new(output: Arc<dyn OutputNode>, config: &SchedulingConfig) -> Result<Self> {
        Self::with_registry(output, Arc::new(SessionRegistry::new()), config)
    }

    /// Create a player wired to the ambient runtime: sessions are
    /// timestamped with its clock and notifications go to a bus it sizes.
    pub fn with_runtime(
        output: Arc<dyn OutputNode>,
        config: &SchedulingConfig,
        runtime: &RuntimeConfig,
    ) -> Result<Self> {
        let registry = Arc::new(SessionRegistry::with_clock(Arc::clone(&runtime.clock)));
        Ok(Self::with_registry(output, registry, config)?.with_event_bus(runtime.event_bus()))
    }

    fn with_registry(
        output: Arc<dyn OutputNode>,
        registry: Arc<SessionRegistry>,
        config: &SchedulingConfig,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::InvalidConfig)?;
        let (sender, receiver) = crossbeam_channel::unbounded();

        let native = NativeScheduler::new(
            Arc::clone(&output),
            Arc::clone(&registry),
            sender.clone(),
            config,
        )?;
        let generic = GenericScheduler::new(Arc::clone(&output), Arc::clone(&registry), sender, config)?;

        Ok(Self::from_parts(
            output,
            registry,
            Arc::new(native),
            Arc::new(generic),
            receiver,
        ))
    }

    /// Assemble a player from existing parts. Both schedulers must share
    /// `registry` and send their events to the sender paired with `control`.
    pub fn from_parts(
        output: Arc<dyn OutputNode>,
        registry: Arc<SessionRegistry>,
        native: Arc<dyn Scheduler>,
        generic: Arc<dyn Scheduler>,
        control: Receiver<SchedulerEvent>,
    ) -> Self {
        Self {
            output,
            registry,
            native,
            generic,
            backend: Mutex::new(Backend::Native),
            state: Mutex::new(PlaybackState::NoTrack),
            control,
            events: None,
        }
    }

    /// Publish playback notifications on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// The bus playback notifications are published on, if any.
    pub fn event_bus(&self) -> Option<&EventBus> {
        self.events.as_ref()
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Play `track` from `start_position`. With `end_position`, the range is
    /// installed as a loop and played as such.
    ///
    /// Does nothing if the track has no playback context.
    #[instrument(skip(self, track), fields(track = track.id()))]
    pub fn play(&self, track: Arc<Track>, start_position: f64, end_position: Option<f64>) {
        let Some(context) = track.playback_context() else {
            warn!("Unable to play track without a playback context");
            return;
        };

        // The layout may differ from the previous track's
        self.output.reconnect(context.audio_format());

        let backend = if track.is_natively_supported() {
            Backend::Native
        } else {
            Backend::Generic
        };
        let previous = std::mem::replace(&mut *self.backend.lock(), backend);
        if previous != backend {
            // Drain the outgoing backend's queue before the output is shared
            // with the new one
            debug!(?previous, ?backend, "Switching scheduler backend");
            self.scheduler_for(previous).stop();
        }

        let playback_loop = end_position.map(|end| PlaybackLoop::complete(start_position, end));
        let session = self.registry.start(Arc::clone(&track), playback_loop);
        let scheduler = self.scheduler();

        match playback_loop {
            Some(_) => scheduler.play_loop(&session, true),
            None => scheduler.play_track(&session, start_position),
        }
        self.set_state(PlaybackState::Playing);

        info!(?backend, start_position, ?end_position, "Playing track");
        self.publish(PlaybackEvent::Started {
            track_id: track.id().to_string(),
            title: track.title().to_string(),
            position_ms: to_millis(start_position),
        });
    }

    /// Seek within the loop's bounds: a target outside an active loop is
    /// moved to the loop start.
    pub fn attempt_seek_to_time(&self, track: &Track, time: f64) -> SeekResult {
        self.seek_to_time(track, time, false)
    }

    /// Seek anywhere in the track: a target outside an active loop removes it.
    pub fn force_seek_to_time(&self, track: &Track, time: f64) -> SeekResult {
        self.seek_to_time(track, time, true)
    }

    #[instrument(skip(self, track), fields(track = track.id()))]
    fn seek_to_time(&self, track: &Track, time: f64, can_seek_outside_loop: bool) -> SeekResult {
        if self.registry.current().is_none() {
            return SeekResult::default();
        }

        let mut seek_time = time;
        let mut loop_removed = false;

        if let Some(playback_loop) = self.playback_loop() {
            if !playback_loop.contains(seek_time) {
                if can_seek_outside_loop {
                    self.registry.remove_loop();
                    loop_removed = true;
                } else if seek_time < playback_loop.start_time {
                    seek_time = playback_loop.start_time;
                } else if playback_loop.end_time.map_or(false, |end| seek_time >= end) {
                    seek_time = playback_loop.start_time;
                }
            }
        }

        let state = self.state();
        let track_playback_completed = seek_time >= track.duration() && state == PlaybackState::Playing;
        let seek_time = clamp(seek_time, 0.0, track.duration());

        if !track_playback_completed {
            if let Some(session) = self.registry.start_new_session_for_playing_track() {
                self.scheduler()
                    .seek_to_time(&session, seek_time, state == PlaybackState::Playing);
            }
        }

        debug!(seek_time, loop_removed, track_playback_completed, "Seek performed");
        self.publish(PlaybackEvent::Seeked {
            track_id: track.id().to_string(),
            position_ms: to_millis(seek_time),
            loop_removed,
        });

        SeekResult {
            actual_seek_position: seek_time,
            loop_removed,
            track_playback_completed,
        }
    }

    /// Current position in seconds, kept within the loop (or the track) so
    /// it never shows an out-of-range value. Zero when no track is loaded.
    pub fn seek_position(&self) -> f64 {
        if !self.state().is_playing_or_paused() {
            return 0.0;
        }
        let Some(session) = self.registry.current() else {
            return 0.0;
        };

        let position = self.output.seek_position();
        let duration = session.track().duration();
        match self.registry.current_loop() {
            Some(playback_loop) => clamp(
                position,
                playback_loop.start_time,
                playback_loop.end_time.unwrap_or(duration),
            ),
            None => clamp(position, 0.0, duration),
        }
    }

    /// Pause playback.
    pub fn pause(&self) {
        let Some(track) = self.registry.playing_track() else {
            debug!("Nothing to pause");
            return;
        };
        self.scheduler().pause();
        self.set_state(PlaybackState::Paused);

        self.publish(PlaybackEvent::Paused {
            track_id: track.id().to_string(),
            position_ms: to_millis(self.seek_position()),
        });
    }

    /// Resume paused playback.
    pub fn resume(&self) {
        let Some(track) = self.registry.playing_track() else {
            debug!("Nothing to resume");
            return;
        };
        self.scheduler().resume();
        self.set_state(PlaybackState::Playing);

        self.publish(PlaybackEvent::Resumed {
            track_id: track.id().to_string(),
            position_ms: to_millis(self.seek_position()),
        });
    }

    /// Stop playback and unload the track.
    pub fn stop(&self) {
        if let Some(track) = self.unload() {
            info!(track = track.id(), "Playback stopped");
            self.publish(PlaybackEvent::Stopped {
                track_id: track.id().to_string(),
            });
        }
    }

    fn unload(&self) -> Option<Arc<Track>> {
        let track = self.registry.playing_track();
        self.registry.end_current();
        self.scheduler().stop();
        self.output.reset();
        self.set_state(PlaybackState::NoTrack);
        track
    }

    // ========================================================================
    // Looping
    // ========================================================================

    /// Replace the loop with `[start, end]` and keep playing from the
    /// current position, moved into the loop if needed.
    #[instrument(skip(self))]
    pub fn define_loop(&self, start: f64, end: f64, is_chapter_loop: bool) {
        let Some(playback_loop) = self.registry.define_loop(start, end, is_chapter_loop) else {
            debug!("No track loaded, cannot define a loop");
            return;
        };
        let Some(session) = self.registry.start_new_session_for_playing_track() else {
            return;
        };

        let position = self.seek_position();
        self.scheduler()
            .play_loop_from(&session, position, self.state() == PlaybackState::Playing);
        self.publish_loop_changed(&session, Some(playback_loop));
    }

    /// Step through the loop lifecycle: mark the start, then the end (which
    /// jumps back to the start), then remove the loop (which continues
    /// linearly from where the loop was).
    ///
    /// Returns the loop after the change.
    pub fn toggle_loop(&self) -> Option<PlaybackLoop> {
        let position = self.seek_position();

        if self.registry.current().is_some() {
            if self.registry.has_loop() {
                if self.registry.has_complete_loop() {
                    self.remove_loop();
                } else {
                    self.end_loop(position);
                }
            } else {
                self.begin_loop(position);
            }
        }

        self.playback_loop()
    }

    fn begin_loop(&self, position: f64) {
        let playback_loop = self.registry.begin_loop(position);
        debug!(position, "Loop started");

        if let Some(session) = self.registry.current() {
            self.publish_loop_changed(&session, playback_loop);
        }
    }

    fn end_loop(&self, position: f64) {
        let playback_loop = self.registry.end_loop(position);
        debug!(position, "Loop completed");

        if let Some(session) = self.registry.start_new_session_for_playing_track() {
            self.scheduler()
                .play_loop(&session, self.state() == PlaybackState::Playing);
            self.publish_loop_changed(&session, playback_loop);
        }
    }

    fn remove_loop(&self) {
        let Some(loop_end_time) = self.playback_loop().and_then(|l| l.end_time) else {
            return;
        };
        self.registry.remove_loop();
        debug!(loop_end_time, "Loop removed");

        if let Some(session) = self.registry.start_new_session_for_playing_track() {
            self.scheduler().end_loop(
                &session,
                loop_end_time,
                self.state() == PlaybackState::Playing,
            );
            self.publish_loop_changed(&session, None);
        }
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Reissue playback after the audio output device changed, from the
    /// same position.
    pub fn audio_output_device_changed(&self) {
        let Some(session) = self.registry.start_new_session_for_playing_track() else {
            return;
        };

        let position = self.seek_position();
        info!(position, "Output device changed, rescheduling");
        self.scheduler()
            .seek_to_time(&session, position, self.state() == PlaybackState::Playing);

        self.publish(PlaybackEvent::OutputDeviceChanged {
            track_id: Some(session.track().id().to_string()),
            position_ms: to_millis(position),
        });
    }

    /// Apply every scheduler event received so far.
    ///
    /// Returns the track whose playback completed, if one did.
    pub fn process_events(&self) -> Option<Arc<Track>> {
        let mut completed = None;
        while let Ok(event) = self.control.try_recv() {
            completed = self.handle_event(event).or(completed);
        }
        completed
    }

    /// Block up to `timeout` for a scheduler event, then apply it and any
    /// others already queued.
    ///
    /// Returns the track whose playback completed, if one did.
    pub fn wait_for_events(&self, timeout: Duration) -> Option<Arc<Track>> {
        match self.control.recv_timeout(timeout) {
            Ok(event) => {
                let completed = self.handle_event(event);
                self.process_events().or(completed)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Scheduler control channel disconnected");
                None
            }
        }
    }

    fn handle_event(&self, event: SchedulerEvent) -> Option<Arc<Track>> {
        if !self.registry.is_current(event.session()) {
            debug!(session = %event.session().id(), "Ignoring event of stale session");
            return None;
        }

        match event {
            SchedulerEvent::TrackCompleted(session) => {
                let track = Arc::clone(session.track());
                info!(track = track.id(), "Track playback completed");
                self.unload();
                self.publish(PlaybackEvent::Completed {
                    track_id: track.id().to_string(),
                });
                Some(track)
            }
            SchedulerEvent::LoopCompleted(session) => {
                self.scheduler().loop_completed(&session);
                if let Some(playback_loop) = session.playback_loop() {
                    self.publish(PlaybackEvent::LoopRestarted {
                        track_id: session.track().id().to_string(),
                        start_ms: to_millis(playback_loop.start_time),
                    });
                }
                None
            }
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current transport state.
    pub fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    /// The loop defined for the playing track.
    pub fn playback_loop(&self) -> Option<PlaybackLoop> {
        self.registry.current_loop()
    }

    /// The track currently loaded.
    pub fn playing_track(&self) -> Option<Arc<Track>> {
        self.registry.playing_track()
    }

    /// When playback of the current track began. Seeks and device changes
    /// do not move it.
    pub fn playing_track_start_time(&self) -> Option<DateTime<Utc>> {
        self.registry
            .current()
            .map(|session| session.track_started_at())
    }

    /// The registry shared with the schedulers.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn scheduler(&self) -> &Arc<dyn Scheduler> {
        let backend = *self.backend.lock();
        self.scheduler_for(backend)
    }

    fn scheduler_for(&self, backend: Backend) -> &Arc<dyn Scheduler> {
        match backend {
            Backend::Native => &self.native,
            Backend::Generic => &self.generic,
        }
    }

    fn set_state(&self, state: PlaybackState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!(from = ?*current, to = ?state, "Playback state changed");
            *current = state;
        }
    }

    fn publish_loop_changed(&self, session: &PlaybackSession, playback_loop: Option<PlaybackLoop>) {
        self.publish(PlaybackEvent::LoopChanged {
            track_id: session.track().id().to_string(),
            start_ms: playback_loop.map(|l| to_millis(l.start_time)),
            end_ms: playback_loop.and_then(|l| l.end_time).map(to_millis),
        });
    }

    fn publish(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.events {
            // No subscribers is fine
            let _ = bus.emit(CoreEvent::Playback(event));
        }
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state())
            .field("backend", &*self.backend.lock())
            .field("session", &self.registry.current())
            .finish()
    }
}

/// Clamp without panicking on an inverted range: `max` wins.
fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

fn to_millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{NativePlaybackContext, PlaybackContext};
    use crate::output::PcmBuffer;
    use crate::scheduling::PlaybackSegment;
    use crate::traits::{AudioFormat, CompletionHandler, MockScheduler};
    use crossbeam_channel::Sender;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct StubOutput {
        position: Mutex<f64>,
        reconnects: AtomicUsize,
        resets: AtomicUsize,
    }

    impl StubOutput {
        fn set_position(&self, seconds: f64) {
            *self.position.lock() = seconds;
        }
    }

    impl OutputNode for StubOutput {
        fn play(&self) {}
        fn pause(&self) {}
        fn stop(&self) {}
        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
        fn is_playing(&self) -> bool {
            false
        }
        fn reconnect(&self, _format: &AudioFormat) {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
        }
        fn schedule_buffer(
            &self,
            _buffer: PcmBuffer,
            _session: &PlaybackSession,
            _completion: CompletionHandler,
            _start_time: Option<f64>,
            _immediate_playback: bool,
        ) {
        }
        fn schedule_segment(
            &self,
            _segment: PlaybackSegment,
            _completion: CompletionHandler,
            _immediate_playback: bool,
        ) {
        }
        fn seek_position(&self) -> f64 {
            *self.position.lock()
        }
        fn seek_to_end_of_track(&self, _session: &PlaybackSession) {}
    }

    struct Fixture {
        _dir: TempDir,
        output: Arc<StubOutput>,
        control: Sender<SchedulerEvent>,
        player: Player,
        track: Arc<Track>,
    }

    /// Player over a mocked native scheduler and a 10 s track. The WAV on
    /// disk is short; only its format matters here.
    fn fixture(native: MockScheduler) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..441 {
            writer.write_sample(0i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let context = NativePlaybackContext::open_file(&path).unwrap();
        let track = Arc::new(
            Track::new("track-1", "Tone", &path, 10.0)
                .with_playback_context(PlaybackContext::Native(Arc::new(context))),
        );

        let output = Arc::new(StubOutput::default());
        let (control, receiver) = crossbeam_channel::unbounded();
        let player = Player::from_parts(
            output.clone(),
            Arc::new(SessionRegistry::new()),
            Arc::new(native),
            Arc::new(MockScheduler::new()),
            receiver,
        );

        Fixture {
            _dir: dir,
            output,
            control,
            player,
            track,
        }
    }

    fn expect_play_track(native: &mut MockScheduler) {
        native.expect_play_track().times(1).return_const(());
    }

    #[test]
    fn test_play_without_context_is_ignored() {
        let f = fixture(MockScheduler::new());
        let bare = Arc::new(Track::new("bare", "Bare", "/missing.m4a", 10.0));

        f.player.play(bare, 0.0, None);

        assert_eq!(f.player.state(), PlaybackState::NoTrack);
        assert!(f.player.playing_track().is_none());
        assert_eq!(f.output.reconnects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_play_reconnects_and_schedules_on_native_backend() {
        let mut native = MockScheduler::new();
        native
            .expect_play_track()
            .withf(|_, start| (*start - 1.5).abs() < 1e-9)
            .times(1)
            .return_const(());
        let f = fixture(native);

        f.player.play(f.track.clone(), 1.5, None);

        assert_eq!(f.player.state(), PlaybackState::Playing);
        assert_eq!(f.output.reconnects.load(Ordering::SeqCst), 1);
        assert_eq!(f.player.playing_track().unwrap().id(), "track-1");
        assert!(f.player.playback_loop().is_none());
    }

    #[test]
    fn test_play_with_end_position_plays_loop() {
        let mut native = MockScheduler::new();
        native
            .expect_play_loop()
            .withf(|session, begin| session.has_complete_loop() && *begin)
            .times(1)
            .return_const(());
        let f = fixture(native);

        f.player.play(f.track.clone(), 1.0, Some(3.0));

        assert_eq!(f.player.playback_loop(), Some(PlaybackLoop::complete(1.0, 3.0)));
    }

    #[test]
    fn test_toggle_loop_cycles_through_lifecycle() {
        let mut native = MockScheduler::new();
        expect_play_track(&mut native);
        native
            .expect_play_loop()
            .withf(|session, begin| {
                session.playback_loop() == Some(PlaybackLoop::complete(1.0, 3.0)) && *begin
            })
            .times(1)
            .return_const(());
        native
            .expect_end_loop()
            .withf(|session, end, begin| {
                !session.has_loop() && (*end - 3.0).abs() < 1e-9 && *begin
            })
            .times(1)
            .return_const(());
        let f = fixture(native);
        f.player.play(f.track.clone(), 0.0, None);

        f.output.set_position(1.0);
        let opened = f.player.toggle_loop().unwrap();
        assert_eq!(opened, PlaybackLoop::open(1.0));
        assert!(!opened.is_complete());

        f.output.set_position(3.0);
        let closed = f.player.toggle_loop().unwrap();
        assert!(closed.is_complete());
        assert_eq!(closed.end_time, Some(3.0));

        assert!(f.player.toggle_loop().is_none());
    }

    #[test]
    fn test_toggle_loop_without_track_does_nothing() {
        let f = fixture(MockScheduler::new());
        assert!(f.player.toggle_loop().is_none());
    }

    #[test]
    fn test_attempt_seek_clamps_into_loop() {
        let mut native = MockScheduler::new();
        native.expect_play_loop().times(1).return_const(());
        native
            .expect_seek_to_time()
            .withf(|_, seconds, begin| (*seconds - 2.0).abs() < 1e-9 && *begin)
            .times(2)
            .return_const(());
        let f = fixture(native);
        f.player.play(f.track.clone(), 2.0, Some(4.0));

        let before = f.player.attempt_seek_to_time(&f.track, 0.5);
        assert_eq!(before.actual_seek_position, 2.0);
        assert!(!before.loop_removed);

        let after = f.player.attempt_seek_to_time(&f.track, 4.5);
        assert_eq!(after.actual_seek_position, 2.0);
        assert!(f.player.playback_loop().is_some());
    }

    #[test]
    fn test_force_seek_outside_loop_removes_it() {
        let mut native = MockScheduler::new();
        native.expect_play_loop().times(1).return_const(());
        native
            .expect_seek_to_time()
            .withf(|session, seconds, _| !session.has_loop() && (*seconds - 6.0).abs() < 1e-9)
            .times(1)
            .return_const(());
        let f = fixture(native);
        f.player.play(f.track.clone(), 2.0, Some(4.0));

        let result = f.player.force_seek_to_time(&f.track, 6.0);

        assert!(result.loop_removed);
        assert_eq!(result.actual_seek_position, 6.0);
        assert!(f.player.playback_loop().is_none());
    }

    #[test]
    fn test_seek_past_end_while_playing_completes_track() {
        let mut native = MockScheduler::new();
        expect_play_track(&mut native);
        native.expect_seek_to_time().never();
        let f = fixture(native);
        f.player.play(f.track.clone(), 0.0, None);

        let result = f.player.attempt_seek_to_time(&f.track, 12.0);

        assert!(result.track_playback_completed);
        assert_eq!(result.actual_seek_position, 10.0);
    }

    #[test]
    fn test_seek_past_end_while_paused_parks_at_end() {
        let mut native = MockScheduler::new();
        expect_play_track(&mut native);
        native.expect_pause().times(1).return_const(());
        native
            .expect_seek_to_time()
            .withf(|_, seconds, begin| (*seconds - 10.0).abs() < 1e-9 && !*begin)
            .times(1)
            .return_const(());
        let f = fixture(native);
        f.player.play(f.track.clone(), 0.0, None);
        f.player.pause();

        let result = f.player.attempt_seek_to_time(&f.track, 12.0);

        assert!(!result.track_playback_completed);
        assert_eq!(result.actual_seek_position, 10.0);
    }

    #[test]
    fn test_seek_without_session_returns_zeros() {
        let f = fixture(MockScheduler::new());
        assert_eq!(f.player.attempt_seek_to_time(&f.track, 5.0), SeekResult::default());
    }

    #[test]
    fn test_seek_position_is_clamped() {
        let mut native = MockScheduler::new();
        expect_play_track(&mut native);
        let f = fixture(native);

        f.output.set_position(4.0);
        assert_eq!(f.player.seek_position(), 0.0);

        f.player.play(f.track.clone(), 0.0, None);
        f.output.set_position(12.0);
        assert_eq!(f.player.seek_position(), 10.0);

        f.player.registry().begin_loop(5.0);
        f.output.set_position(3.0);
        assert_eq!(f.player.seek_position(), 5.0);
    }

    #[test]
    fn test_stop_unloads_track() {
        let mut native = MockScheduler::new();
        expect_play_track(&mut native);
        native.expect_stop().times(1).return_const(());
        let f = fixture(native);
        f.player.play(f.track.clone(), 0.0, None);

        f.player.stop();

        assert_eq!(f.player.state(), PlaybackState::NoTrack);
        assert!(f.player.playing_track().is_none());
        assert_eq!(f.output.resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_track_completion_unloads_and_reports_track() {
        let mut native = MockScheduler::new();
        expect_play_track(&mut native);
        native.expect_stop().times(1).return_const(());
        let f = fixture(native);
        f.player.play(f.track.clone(), 0.0, None);
        let session = f.player.registry().current().unwrap();

        f.control.send(SchedulerEvent::TrackCompleted(session)).unwrap();
        let completed = f.player.process_events().unwrap();

        assert_eq!(completed.id(), "track-1");
        assert_eq!(f.player.state(), PlaybackState::NoTrack);
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let mut native = MockScheduler::new();
        native.expect_play_track().times(2).return_const(());
        native.expect_loop_completed().never();
        let f = fixture(native);

        f.player.play(f.track.clone(), 0.0, None);
        let stale = f.player.registry().current().unwrap();
        f.player.play(f.track.clone(), 0.0, None);

        f.control.send(SchedulerEvent::TrackCompleted(stale.clone())).unwrap();
        f.control.send(SchedulerEvent::LoopCompleted(stale)).unwrap();

        assert!(f.player.process_events().is_none());
        assert_eq!(f.player.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_loop_completion_restarts_loop() {
        let mut native = MockScheduler::new();
        native.expect_play_loop().times(1).return_const(());
        native.expect_loop_completed().times(1).return_const(());
        let f = fixture(native);
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let player = Player { events: Some(bus), ..f.player };

        player.play(f.track.clone(), 2.0, Some(4.0));
        let session = player.registry().current().unwrap();
        f.control.send(SchedulerEvent::LoopCompleted(session)).unwrap();

        assert!(player.wait_for_events(Duration::from_secs(1)).is_none());
        assert!(matches!(
            events.try_recv().unwrap(),
            CoreEvent::Playback(PlaybackEvent::Started { .. })
        ));
        assert_eq!(
            events.try_recv().unwrap(),
            CoreEvent::Playback(PlaybackEvent::LoopRestarted {
                track_id: "track-1".to_string(),
                start_ms: 2_000,
            })
        );
    }

    #[test]
    fn test_device_change_reseeks_from_same_position() {
        let mut native = MockScheduler::new();
        expect_play_track(&mut native);
        native
            .expect_seek_to_time()
            .withf(|_, seconds, begin| (*seconds - 7.25).abs() < 1e-9 && *begin)
            .times(1)
            .return_const(());
        let f = fixture(native);
        f.player.play(f.track.clone(), 0.0, None);
        let started_at = f.player.playing_track_start_time().unwrap();
        let before = f.player.registry().current().unwrap();

        f.output.set_position(7.25);
        f.player.audio_output_device_changed();

        let after = f.player.registry().current().unwrap();
        assert_ne!(before, after);
        assert_eq!(f.player.playing_track_start_time(), Some(started_at));
    }

    #[test]
    fn test_define_loop_plays_from_clamped_position() {
        let mut native = MockScheduler::new();
        expect_play_track(&mut native);
        native
            .expect_play_loop_from()
            .withf(|session, start, begin| {
                session.playback_loop().map_or(false, |l| l.is_chapter_loop)
                    && (*start - 6.0).abs() < 1e-9
                    && *begin
            })
            .times(1)
            .return_const(());
        let f = fixture(native);
        f.player.play(f.track.clone(), 0.0, None);
        f.output.set_position(1.0);

        f.player.define_loop(6.0, 8.0, true);

        assert_eq!(f.player.playback_loop().unwrap().end_time, Some(8.0));
    }
}
