//! # Buffer Scheduling
//!
//! Keeps the output node fed with audio for the current session.
//!
//! ## Two-Phase Scheduling
//!
//! ```text
//! play/seek ──► immediate chunk (caller thread) ──► output node
//!           └─► deferred chunk (serial queue) ───► output node
//!                                                     │ completion
//!               deferred chunk (serial queue) ◄───────┘
//! ```
//!
//! Every start decodes one short chunk synchronously so sound begins at
//! once, then queues a larger look-ahead chunk. Each completion queues one
//! more until the source is exhausted. When the last in-flight buffer of
//! an exhausted run completes, a [`SchedulerEvent`] is sent to the
//! controlling thread.
//!
//! Completions carry the session that scheduled the buffer and are dropped
//! unless that session is still current.

mod counter;
mod engine;
mod generic;
mod native;
mod queue;
mod segment;

pub use counter::BufferCounter;
pub use engine::BufferScheduler;
pub use generic::GenericScheduler;
pub use native::NativeScheduler;
pub use segment::{compute_segment, PlaybackSegment};

use crate::session::PlaybackSession;

/// Signals sent from scheduling threads to the controlling thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// Every buffer of the track has played.
    TrackCompleted(PlaybackSession),
    /// One iteration of the session's loop has played.
    LoopCompleted(PlaybackSession),
}

impl SchedulerEvent {
    /// Session the event belongs to.
    pub fn session(&self) -> &PlaybackSession {
        match self {
            SchedulerEvent::TrackCompleted(session) | SchedulerEvent::LoopCompleted(session) => {
                session
            }
        }
    }
}
