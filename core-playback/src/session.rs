//! # Playback Sessions
//!
//! A [`PlaybackSession`] is an identity token for one continuous attempt to
//! play a track. Every buffer handed to the output node is tagged with the
//! session that scheduled it, and completions are only acted upon while that
//! session is still the current one.
//!
//! Sessions are immutable. Restarting playback (seek, loop change, device
//! change) always installs a brand new session; the loop descriptor being
//! edited by the user lives in a separate "current loop" slot of the
//! [`SessionRegistry`] and is captured by the next session that starts.

use crate::track::Track;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// Playback Loop
// ============================================================================

/// A segment loop. Open-ended until its end time is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackLoop {
    /// Loop start in seconds.
    pub start_time: f64,
    /// Loop end in seconds, `None` while the loop is still being defined.
    pub end_time: Option<f64>,
    /// Whether the loop was created from a chapter rather than by the user.
    pub is_chapter_loop: bool,
}

impl PlaybackLoop {
    /// Loop with only a start point.
    pub fn open(start_time: f64) -> Self {
        Self {
            start_time,
            end_time: None,
            is_chapter_loop: false,
        }
    }

    /// Loop with both bounds. Bounds given in reverse order are swapped.
    pub fn complete(start_time: f64, end_time: f64) -> Self {
        Self {
            start_time: start_time.min(end_time),
            end_time: Some(start_time.max(end_time)),
            is_chapter_loop: false,
        }
    }

    /// Mark this loop as a chapter loop.
    pub fn as_chapter_loop(mut self) -> Self {
        self.is_chapter_loop = true;
        self
    }

    /// Returns `true` when both bounds are set.
    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    /// Length of the loop, if complete.
    pub fn duration(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Returns `true` if `time` lies within the loop. An open loop contains
    /// everything from its start onwards.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && self.end_time.map_or(true, |end| time <= end)
    }
}

// ============================================================================
// Playback Session
// ============================================================================

struct SessionInner {
    id: Uuid,
    track: Arc<Track>,
    playback_loop: Option<PlaybackLoop>,
    timestamp: DateTime<Utc>,
    track_started_at: DateTime<Utc>,
}

/// Identity token for one continuous playback attempt.
///
/// Cloning is cheap and preserves identity; two sessions compare equal only
/// if they are clones of the same session.
#[derive(Clone)]
pub struct PlaybackSession {
    inner: Arc<SessionInner>,
}

impl PlaybackSession {
    fn new(
        track: Arc<Track>,
        playback_loop: Option<PlaybackLoop>,
        timestamp: DateTime<Utc>,
        track_started_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                track,
                playback_loop,
                timestamp,
                track_started_at: track_started_at.unwrap_or(timestamp),
            }),
        }
    }

    /// Unique identifier of this session.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The track being played.
    pub fn track(&self) -> &Arc<Track> {
        &self.inner.track
    }

    /// Loop captured when this session started.
    pub fn playback_loop(&self) -> Option<PlaybackLoop> {
        self.inner.playback_loop
    }

    /// Returns `true` if this session plays a loop, complete or not.
    pub fn has_loop(&self) -> bool {
        self.inner.playback_loop.is_some()
    }

    /// Returns `true` if this session plays a bounded loop.
    pub fn has_complete_loop(&self) -> bool {
        self.inner
            .playback_loop
            .map_or(false, |playback_loop| playback_loop.is_complete())
    }

    /// When this session was created.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.inner.timestamp
    }

    /// When the track first started playing. Refreshed sessions inherit it.
    pub fn track_started_at(&self) -> DateTime<Utc> {
        self.inner.track_started_at
    }
}

impl PartialEq for PlaybackSession {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for PlaybackSession {}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.inner.id)
            .field("track", &self.inner.track.id())
            .field("loop", &self.inner.playback_loop)
            .finish()
    }
}

// ============================================================================
// Session Registry
// ============================================================================

#[derive(Default)]
struct RegistryState {
    current: Option<PlaybackSession>,
    current_loop: Option<PlaybackLoop>,
}

/// Owner of the single "current session" slot.
///
/// Shared by handle between the player and both schedulers. Operations that
/// need a current session are no-ops when there is none.
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    clock: Arc<dyn Clock>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl SessionRegistry {
    /// Create an empty registry timestamping sessions with the system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry timestamping sessions with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            clock,
        }
    }

    /// Install a new current session for `track`, invalidating the previous one.
    pub fn start(&self, track: Arc<Track>, playback_loop: Option<PlaybackLoop>) -> PlaybackSession {
        let session = PlaybackSession::new(track, playback_loop, self.clock.now(), None);
        let mut state = self.state.write();
        state.current = Some(session.clone());
        state.current_loop = playback_loop;
        debug!(session = %session.id(), "Started playback session");
        session
    }

    /// Install a fresh session for the track that is already playing,
    /// carrying the current loop over. Returns `None` if no track is loaded.
    pub fn start_new_session_for_playing_track(&self) -> Option<PlaybackSession> {
        let mut state = self.state.write();
        let previous = state.current.as_ref()?;
        let session = PlaybackSession::new(
            Arc::clone(previous.track()),
            state.current_loop,
            self.clock.now(),
            Some(previous.track_started_at()),
        );
        state.current = Some(session.clone());
        debug!(session = %session.id(), "Refreshed playback session");
        Some(session)
    }

    /// Clear the current session. Every outstanding session becomes stale.
    pub fn end_current(&self) {
        let mut state = self.state.write();
        state.current = None;
        state.current_loop = None;
    }

    /// Returns `true` if `session` is the current session.
    pub fn is_current(&self, session: &PlaybackSession) -> bool {
        self.state
            .read()
            .current
            .as_ref()
            .map_or(false, |current| current == session)
    }

    /// The current session, if any.
    pub fn current(&self) -> Option<PlaybackSession> {
        self.state.read().current.clone()
    }

    /// The track of the current session, if any.
    pub fn playing_track(&self) -> Option<Arc<Track>> {
        self.state
            .read()
            .current
            .as_ref()
            .map(|session| Arc::clone(session.track()))
    }

    /// The loop being edited for the current track.
    pub fn current_loop(&self) -> Option<PlaybackLoop> {
        self.state.read().current_loop
    }

    /// Start a new open loop at `time`.
    pub fn begin_loop(&self, time: f64) -> Option<PlaybackLoop> {
        self.update_loop(|_| Some(PlaybackLoop::open(time)))
    }

    /// Close the open loop at `time`. Has no effect if no loop was begun.
    pub fn end_loop(&self, time: f64) -> Option<PlaybackLoop> {
        self.update_loop(|current| {
            current.map(|playback_loop| PlaybackLoop {
                end_time: Some(time.max(playback_loop.start_time)),
                ..playback_loop
            })
        })
    }

    /// Remove the loop entirely.
    pub fn remove_loop(&self) {
        self.update_loop(|_| None);
    }

    /// Replace the loop with a complete one.
    pub fn define_loop(&self, start: f64, end: f64, is_chapter_loop: bool) -> Option<PlaybackLoop> {
        self.update_loop(|_| {
            let playback_loop = PlaybackLoop::complete(start, end);
            Some(if is_chapter_loop {
                playback_loop.as_chapter_loop()
            } else {
                playback_loop
            })
        })
    }

    /// Returns `true` if a loop (complete or open) is defined.
    pub fn has_loop(&self) -> bool {
        self.state.read().current_loop.is_some()
    }

    /// Returns `true` if a complete loop is defined.
    pub fn has_complete_loop(&self) -> bool {
        self.state
            .read()
            .current_loop
            .map_or(false, |playback_loop| playback_loop.is_complete())
    }

    fn update_loop(
        &self,
        change: impl FnOnce(Option<PlaybackLoop>) -> Option<PlaybackLoop>,
    ) -> Option<PlaybackLoop> {
        let mut state = self.state.write();
        if state.current.is_none() {
            return None;
        }
        state.current_loop = change(state.current_loop);
        state.current_loop
    }
}
