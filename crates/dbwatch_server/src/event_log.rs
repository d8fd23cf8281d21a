//! Server-side event history and watch fan-out.

use crate::error::{ServerError, ServerResult};
use dbwatch_api::{Database, WatchEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Revision assigned to the mutation.
    pub revision: u64,
    /// The event as delivered to watchers.
    pub event: WatchEvent<Database>,
    /// Object state before a modification, used for selector transitions.
    pub previous: Option<Database>,
}

impl StoredEvent {
    /// Creates a stored event.
    pub fn new(revision: u64, event: WatchEvent<Database>, previous: Option<Database>) -> Self {
        Self {
            revision,
            event,
            previous,
        }
    }
}

/// Bounded event history plus a broadcast channel for live delivery.
///
/// The log keeps the most recent `max_history` events. Everything at or
/// below `compacted` has been discarded; a watch asking to resume from an
/// earlier revision cannot be served.
pub struct EventLog {
    history: VecDeque<Arc<StoredEvent>>,
    max_history: usize,
    compacted: u64,
    sender: broadcast::Sender<Arc<StoredEvent>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new(max_history: usize, watch_buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(watch_buffer.max(1));
        Self {
            history: VecDeque::new(),
            max_history,
            compacted: 0,
            sender,
        }
    }

    /// Records an event and, if `deliver` is set, sends it to live watchers.
    pub fn append(&mut self, event: StoredEvent, deliver: bool) -> Arc<StoredEvent> {
        let event = Arc::new(event);
        self.history.push_back(Arc::clone(&event));
        while self.history.len() > self.max_history {
            if let Some(dropped) = self.history.pop_front() {
                self.compacted = dropped.revision;
            }
        }
        if deliver {
            // No receivers is not an error.
            let _ = self.sender.send(Arc::clone(&event));
        }
        event
    }

    /// Sends an event to live watchers without recording it.
    pub fn broadcast(&self, event: StoredEvent) {
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribes to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StoredEvent>> {
        self.sender.subscribe()
    }

    /// Returns retained events after `revision`.
    pub fn since(&self, revision: u64) -> ServerResult<Vec<Arc<StoredEvent>>> {
        if revision < self.compacted {
            return Err(ServerError::Expired {
                requested: revision,
                compacted: self.compacted,
            });
        }
        Ok(self
            .history
            .iter()
            .filter(|e| e.revision > revision)
            .cloned()
            .collect())
    }

    /// Discards all history up to and including `revision`.
    pub fn compact(&mut self, revision: u64) {
        while self
            .history
            .front()
            .is_some_and(|e| e.revision <= revision)
        {
            self.history.pop_front();
        }
        self.compacted = self.compacted.max(revision);
    }

    /// Returns the compaction point.
    pub fn compacted(&self) -> u64 {
        self.compacted
    }

    /// Returns the number of retained events.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns true if no events are retained.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Returns the number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
