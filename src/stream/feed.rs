use std::collections::VecDeque;

use crate::remote::SessionEvent;

/// Bounded, newest-first history of stream events.
///
/// Best-effort observability feed: once full, the oldest event is dropped
/// silently on every push.
#[derive(Debug)]
pub struct EventFeed {
    capacity: usize,
    events: VecDeque<SessionEvent>,
    total_received: u64,
}

impl EventFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
            total_received: 0,
        }
    }

    pub fn push(&mut self, event: SessionEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_back();
        }
        self.events.push_front(event);
        self.total_received += 1;
    }

    /// Retained events, newest first
    pub fn snapshot(&self) -> Vec<SessionEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&SessionEvent> {
        self.events.front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events accepted since creation, including ones already evicted
    pub fn total_received(&self) -> u64 {
        self.total_received
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
