//! Assignment event fan-out.
//!
//! Envelopes are numbered under a lock and sent in that order, so every
//! subscriber sees strictly increasing sequence numbers. Sending with no
//! subscribers is not an error.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use org_planner_core::events::{AssignmentEvent, EventEnvelope};

const DEFAULT_CAPACITY: usize = 256;

pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
    last_sequence: Mutex<u64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            last_sequence: Mutex::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn last_sequence(&self) -> u64 {
        *self.last_sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number and send the events of one committed operation.
    pub fn publish(&self, events: Vec<AssignmentEvent>, timestamp: DateTime<Utc>) -> Vec<EventEnvelope> {
        if events.is_empty() {
            return Vec::new();
        }
        let mut seq = self.last_sequence.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sent = Vec::with_capacity(events.len());
        for event in events {
            *seq += 1;
            let envelope = EventEnvelope::new(*seq, timestamp, event);
            let _ = self.tx.send(envelope.clone());
            sent.push(envelope);
        }
        sent
    }
}
