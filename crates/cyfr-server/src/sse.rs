//! Per-session SSE fan-out.
//!
//! Each session owns a bounded ring of `{id, data}` events plus a
//! broadcast channel for live subscribers. `Last-Event-ID` resumption
//! replays the buffered tail; ordering within one session is append
//! order, with no guarantee across sessions.

use std::collections::VecDeque;

use dashmap::DashMap;
use tokio::sync::broadcast;

/// Ring capacity per session; oldest events are evicted first.
const RING_CAPACITY: usize = 256;

/// Broadcast fan-out capacity; a subscriber this far behind is lagged
/// out and reconnects via `Last-Event-ID`.
const CHANNEL_CAPACITY: usize = 64;

/// One buffered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseRecord {
    /// Monotonic per-session id, starting at 1.
    pub id: u64,
    /// Event payload (already serialized).
    pub data: String,
}

struct SessionChannel {
    next_id: u64,
    ring: VecDeque<SseRecord>,
    tx: broadcast::Sender<SseRecord>,
}

impl SessionChannel {
    fn new() -> Self {
        Self {
            next_id: 1,
            ring: VecDeque::with_capacity(RING_CAPACITY),
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }
}

/// The hub: session id to buffer + subscribers.
#[derive(Default)]
pub struct SseHub {
    sessions: DashMap<String, SessionChannel>,
}

impl SseHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to a session's ring and deliver it to live
    /// subscribers. Returns the assigned event id.
    pub fn publish(&self, session_id: &str, data: impl Into<String>) -> u64 {
        let mut channel = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionChannel::new);
        let record = SseRecord {
            id: channel.next_id,
            data: data.into(),
        };
        channel.next_id += 1;
        if channel.ring.len() == RING_CAPACITY {
            channel.ring.pop_front();
        }
        channel.ring.push_back(record.clone());
        // No receivers is fine; the ring still holds the event.
        let _ = channel.tx.send(record.clone());
        record.id
    }

    /// Register a live subscriber for a session.
    #[must_use]
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<SseRecord> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionChannel::new)
            .tx
            .subscribe()
    }

    /// Buffered events whose id follows `last_event_id`, in append order.
    #[must_use]
    pub fn since(&self, session_id: &str, last_event_id: u64) -> Vec<SseRecord> {
        self.sessions
            .get(session_id)
            .map(|channel| {
                channel
                    .ring
                    .iter()
                    .filter(|record| record.id > last_event_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop a session's buffer and subscribers (session termination).
    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

impl std::fmt::Debug for SseHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseHub")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_assigns_monotonic_ids() {
        let hub = SseHub::new();
        assert_eq!(hub.publish("s1", "a"), 1);
        assert_eq!(hub.publish("s1", "b"), 2);
        // Independent per session.
        assert_eq!(hub.publish("s2", "x"), 1);
    }

    #[test]
    fn test_since_replays_tail() {
        let hub = SseHub::new();
        for i in 1..=5 {
            hub.publish("s1", format!("event-{i}"));
        }
        let tail = hub.since("s1", 3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].id, 4);
        assert_eq!(tail[1].id, 5);
        assert!(hub.since("s1", 5).is_empty());
        assert!(hub.since("unknown", 0).is_empty());
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let hub = SseHub::new();
        for i in 0..(RING_CAPACITY + 10) {
            hub.publish("s1", format!("event-{i}"));
        }
        let all = hub.since("s1", 0);
        assert_eq!(all.len(), RING_CAPACITY);
        assert_eq!(all[0].id, 11);
    }

    #[tokio::test]
    async fn test_live_delivery_in_order() {
        let hub = SseHub::new();
        let mut rx = hub.subscribe("s1");
        hub.publish("s1", "first");
        hub.publish("s1", "second");

        assert_eq!(rx.recv().await.unwrap().data, "first");
        assert_eq!(rx.recv().await.unwrap().data, "second");
    }
}
