//! # Event Bus System
//!
//! Broadcasts playback notifications to whoever drives the UI, using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wrapping the typed [`PlaybackEvent`] hierarchy
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐     subscribe    ┌────────────┐
//! │   Player    ├──────────────>│ EventBus  ├─────────────────>│ Subscriber │
//! └─────────────┘               │ (broadcast│                  └────────────┘
//!                               │  channel) │     subscribe    ┌────────────┐
//!                               │           ├─────────────────>│ Subscriber │
//!                               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! let event_bus = EventBus::new(100);
//! let _subscriber = event_bus.subscribe();
//!
//! let event = CoreEvent::Playback(PlaybackEvent::Paused {
//!     track_id: "track-1".to_string(),
//!     position_ms: 12_500,
//! });
//! assert_eq!(event_bus.emit(event).ok(), Some(1));
//! ```
//!
//! ## Performance Considerations
//!
//! - **Buffer Size**: Subscribers falling more than `capacity` events behind
//!   receive `RecvError::Lagged`.
//! - **Publishing without subscribers** fails with `SendError`; publishers that
//!   do not care (the player) ignore it.
//! - **Cloning**: Events are cloned for each subscriber. Keep payloads lightweight.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published and received through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playback-related events
    Playback(PlaybackEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error {
                recoverable: false, ..
            }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Started { .. })
            | CoreEvent::Playback(PlaybackEvent::Completed { .. })
            | CoreEvent::Playback(PlaybackEvent::OutputDeviceChanged { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Track the event refers to, if any.
    pub fn track_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Playback(e) => e.track_id(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events related to audio playback. Positions are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// Playback of a track started.
    Started {
        /// The track ID being played.
        track_id: String,
        /// Track title.
        title: String,
        /// Start position.
        position_ms: u64,
    },
    /// Playback paused.
    Paused {
        /// The track ID.
        track_id: String,
        /// Position when paused.
        position_ms: u64,
    },
    /// Playback resumed after pause.
    Resumed {
        /// The track ID.
        track_id: String,
        /// Position when resumed.
        position_ms: u64,
    },
    /// Playback stopped by the user; no track is loaded anymore.
    Stopped {
        /// The track ID that was playing.
        track_id: String,
    },
    /// Track finished playing naturally.
    Completed {
        /// The track ID that completed.
        track_id: String,
    },
    /// Playback jumped to a new position.
    Seeked {
        /// The track ID.
        track_id: String,
        /// Position actually seeked to.
        position_ms: u64,
        /// Whether the seek removed the active loop.
        loop_removed: bool,
    },
    /// The segment loop was begun, completed, redefined or removed.
    LoopChanged {
        /// The track ID.
        track_id: String,
        /// Loop start, `None` once the loop is removed.
        start_ms: Option<u64>,
        /// Loop end, `None` while the loop is open.
        end_ms: Option<u64>,
    },
    /// One loop iteration finished and the loop restarted from its start.
    LoopRestarted {
        /// The track ID.
        track_id: String,
        /// Loop start.
        start_ms: u64,
    },
    /// Playback was reissued on a new audio output device.
    OutputDeviceChanged {
        /// The track ID, if a track was loaded.
        track_id: Option<String>,
        /// Position playback continued from.
        position_ms: u64,
    },
    /// Playback error occurred.
    Error {
        /// The track ID if available.
        track_id: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Whether playback can be retried.
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Completed { .. } => "Track completed",
            PlaybackEvent::Seeked { .. } => "Playback position changed",
            PlaybackEvent::LoopChanged { .. } => "Loop changed",
            PlaybackEvent::LoopRestarted { .. } => "Loop restarted",
            PlaybackEvent::OutputDeviceChanged { .. } => "Output device changed",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }

    fn track_id(&self) -> Option<&str> {
        match self {
            PlaybackEvent::Started { track_id, .. }
            | PlaybackEvent::Paused { track_id, .. }
            | PlaybackEvent::Resumed { track_id, .. }
            | PlaybackEvent::Stopped { track_id }
            | PlaybackEvent::Completed { track_id }
            | PlaybackEvent::Seeked { track_id, .. }
            | PlaybackEvent::LoopChanged { track_id, .. }
            | PlaybackEvent::LoopRestarted { track_id, .. } => Some(track_id),
            PlaybackEvent::OutputDeviceChanged { track_id, .. }
            | PlaybackEvent::Error { track_id, .. } => track_id.as_deref(),
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends, usable from plain threads
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///
    /// # Example
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    ///
    /// ```no_run
    /// use core_runtime::events::EventBus;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let event_bus = EventBus::new(100);
    /// let mut subscriber = event_bus.subscribe();
    ///
    /// tokio::spawn(async move {
    ///     while let Ok(event) = subscriber.recv().await {
    ///         println!("Received: {:?}", event);
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let errors = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
