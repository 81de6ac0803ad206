//! Event-rate history.
//!
//! The encoder records one event per finished frame; the rate over the last
//! `size` events is what progress displays show as "frames per second".

use std::collections::VecDeque;
use std::time::Instant;

/// Sliding window of event instants.
#[derive(Debug, Clone)]
pub struct EventHistory {
    size: usize,
    events: VecDeque<Instant>,
}

impl EventHistory {
    /// Create a history remembering at most `size` events.
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(2),
            events: VecDeque::with_capacity(size.max(2)),
        }
    }

    /// Record an event happening now.
    pub fn event(&mut self) {
        self.event_at(Instant::now());
    }

    /// Record an event at a known instant.
    pub fn event_at(&mut self, at: Instant) {
        if self.events.len() == self.size {
            self.events.pop_front();
        }
        self.events.push_back(at);
    }

    /// Events per second across the window, or 0 with fewer than two events.
    pub fn rate(&self) -> f32 {
        let (Some(first), Some(last)) = (self.events.front(), self.events.back()) else {
            return 0.0;
        };
        let span = last.duration_since(*first).as_secs_f64();
        if self.events.len() < 2 || span <= 0.0 {
            return 0.0;
        }
        ((self.events.len() - 1) as f64 / span) as f32
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
