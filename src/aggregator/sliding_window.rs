//! Count-bounded sliding window over recent requests
//!
//! Unlike a time-windowed buffer, the window here is sized in requests: it
//! always holds the most recent `capacity` events, regardless of how long
//! ago they arrived.

use crate::events::RequestEvent;
use std::collections::VecDeque;

/// Upper bound on storage reserved up front; larger windows grow on demand
const PREALLOCATE_LIMIT: usize = 4096;

/// Fixed-capacity FIFO of the most recent request events
///
/// Events are kept in arrival order. Appending to a full window evicts the
/// oldest event.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Events, oldest first
    events: VecDeque<RequestEvent>,
    /// Maximum number of events retained
    capacity: usize,
}

impl SlidingWindow {
    /// Create an empty window holding at most `capacity` events
    ///
    /// # Examples
    ///
    /// ```
    /// use poolwatch::aggregator::SlidingWindow;
    ///
    /// let window = SlidingWindow::new(200);
    /// assert_eq!(window.size(), 0);
    /// assert_eq!(window.capacity(), 200);
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(PREALLOCATE_LIMIT)),
            capacity,
        }
    }

    /// Append an event, evicting the oldest one if the window is full
    pub fn append(&mut self, event: RequestEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Current contents, oldest first
    pub fn snapshot(&self) -> impl Iterator<Item = &RequestEvent> + '_ {
        self.events.iter()
    }

    /// Number of events currently held
    pub fn size(&self) -> usize {
        self.events.len()
    }

    /// Maximum number of events the window holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use chrono::Utc;
    use quickcheck_macros::quickcheck;

    fn numbered_event(n: usize) -> RequestEvent {
        RequestEvent {
            pool: format!("pool{}", n),
            status: 200,
            upstream_status: None,
            observed_at: Utc::now(),
        }
    }

    #[quickcheck]
    fn prop_size_never_exceeds_capacity(capacity: u8, appends: u16) -> bool {
        let capacity = capacity as usize;
        let mut window = SlidingWindow::new(capacity);

        (0..appends as usize).all(|n| {
            window.append(numbered_event(n));
            window.size() <= capacity
        })
    }

    #[quickcheck]
    fn prop_window_holds_last_capacity_events(capacity: u8, extra: u8) -> bool {
        let capacity = capacity as usize;
        let total = capacity + extra as usize;
        let mut window = SlidingWindow::new(capacity);

        for n in 0..total {
            window.append(numbered_event(n));
        }

        let expected: Vec<String> = (total - capacity..total).map(|n| format!("pool{}", n)).collect();
        let actual: Vec<String> = window.snapshot().map(|e| e.pool.clone()).collect();
        actual == expected
    }
}
