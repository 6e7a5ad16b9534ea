//! Bridges asynchronous transport notifications into a single worker context.
//!
//! The network stack behind the interface adapter is not reentrant, so every
//! mutation must happen in one logical owner. Notification callbacks can fire
//! from arbitrary producer contexts; this crate serializes them into a bounded
//! [`EventQueue`] with a non-waiting producer side and a single blocking
//! consumer.
//!
//! Backpressure policy: a full queue drops the newest event rather than making
//! the producer wait. Dropped arrival hints are harmless (the next arrival
//! still triggers a full drain) and dropped link events are reconciled by the
//! consumer re-sampling the transport's link state on every wakeup.
#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use ipusb_transport::TransportEventSink;

/// Default queue depth; sized for the three event kinds plus one in flight.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// One serialized transport notification. Tags only: `RxReady` is a hint that
/// one or more datagrams are retrievable, not a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetifEvent {
    LinkUp,
    LinkDown,
    RxReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostError {
    /// The queue is at capacity; the event was dropped.
    Full,
}

/// Best-effort counters for debugging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventQueueStats {
    /// Events accepted into the queue.
    pub posted: u64,
    /// Events dropped because the queue was full.
    pub dropped: u64,
}

#[derive(Default)]
struct Inner {
    events: VecDeque<NetifEvent>,
    stats: EventQueueStats,
}

/// Bounded FIFO shared between any number of producers and one consumer.
///
/// Producers use [`try_post`](Self::try_post) and never wait for space; only
/// the consumer blocks, in [`recv`](Self::recv). Retained events are always
/// delivered in post order.
pub struct EventQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event queue capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
            ready: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `event` without waiting for space.
    ///
    /// On a full queue the event is counted as dropped and `Err(Full)` is
    /// returned; already-queued events are unaffected.
    pub fn try_post(&self, event: NetifEvent) -> Result<(), PostError> {
        let mut inner = self.lock();
        if inner.events.len() == self.capacity {
            inner.stats.dropped += 1;
            return Err(PostError::Full);
        }
        inner.events.push_back(event);
        inner.stats.posted += 1;
        drop(inner);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until an event is available and take it.
    pub fn recv(&self) -> NetifEvent {
        let mut inner = self.lock();
        loop {
            if let Some(event) = inner.events.pop_front() {
                return event;
            }
            inner = self
                .ready
                .wait(inner)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&self) -> Option<NetifEvent> {
        self.lock().events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    pub fn stats(&self) -> EventQueueStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// [`TransportEventSink`] that posts the matching tag onto an [`EventQueue`].
///
/// This is what the scheduled deployment arms on the transport: notification
/// contexts post and return immediately, and the worker task drains.
pub struct QueueEventSink {
    queue: Arc<EventQueue>,
}

impl QueueEventSink {
    pub fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    fn post(&self, event: NetifEvent) {
        if self.queue.try_post(event).is_err() {
            tracing::warn!("event queue full, dropping {event:?}");
        }
    }
}

impl TransportEventSink for QueueEventSink {
    fn link_opened(&self, _speed_bps: u64) {
        // The consumer re-reads the negotiated speed from the transport when
        // it handles the event; the queue carries tags only.
        self.post(NetifEvent::LinkUp);
    }

    fn link_closed(&self) {
        self.post(NetifEvent::LinkDown);
    }

    fn datagrams_arrived(&self) {
        self.post(NetifEvent::RxReady);
    }
}
