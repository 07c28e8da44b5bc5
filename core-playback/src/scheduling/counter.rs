//! Per-session in-flight buffer counters.

use crate::session::PlaybackSession;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Number of buffers handed to the output node and not yet completed.
///
/// Never goes below zero: a decrement with nothing in flight is refused.
#[derive(Debug, Default)]
pub struct BufferCounter {
    in_flight: AtomicI64,
    completion_signalled: AtomicBool,
}

impl BufferCounter {
    /// Count one more buffer. Returns the new count.
    pub fn increment(&self) -> i64 {
        self.in_flight.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count one completed buffer. Returns the new count, or `None` if
    /// nothing was in flight.
    pub fn decrement(&self) -> Option<i64> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 0).then(|| count - 1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    /// Current count.
    pub fn value(&self) -> i64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim the right to signal completion. Returns `true` exactly once.
    pub fn claim_completion(&self) -> bool {
        !self.completion_signalled.swap(true, Ordering::AcqRel)
    }
}

/// Counters keyed by session. Only the most recently reset session is
/// tracked; counters of older sessions are dropped.
#[derive(Default)]
pub(crate) struct SessionCounters {
    counters: RwLock<HashMap<Uuid, Arc<BufferCounter>>>,
}

impl SessionCounters {
    /// Start counting from zero for `session`.
    pub(crate) fn reset(&self, session: &PlaybackSession) -> Arc<BufferCounter> {
        let counter = Arc::new(BufferCounter::default());
        let mut counters = self.counters.write();
        counters.clear();
        counters.insert(session.id(), Arc::clone(&counter));
        counter
    }

    pub(crate) fn get(&self, session: &PlaybackSession) -> Option<Arc<BufferCounter>> {
        self.counters.read().get(&session.id()).cloned()
    }

    pub(crate) fn value(&self, session: &PlaybackSession) -> i64 {
        self.get(session).map_or(0, |counter| counter.value())
    }

    /// Returns `true` if `counter` belongs to the run currently tracked
    /// for `session`.
    pub(crate) fn is_active(&self, session: &PlaybackSession, counter: &Arc<BufferCounter>) -> bool {
        self.get(session)
            .map_or(false, |active| Arc::ptr_eq(&active, counter))
    }

    pub(crate) fn clear(&self) {
        self.counters.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decrement_never_goes_negative() {
        let counter = BufferCounter::default();
        counter.increment();
        counter.increment();

        assert_eq!(counter.decrement(), Some(1));
        assert_eq!(counter.decrement(), Some(0));
        assert_eq!(counter.decrement(), None);
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn test_completion_claimed_once() {
        let counter = BufferCounter::default();
        assert!(counter.claim_completion());
        assert!(!counter.claim_completion());
    }
}
