//! Ordered message history replayed to newcomers.
//!
//! Backlog order is publish order, always. The bound is explicit: `None`
//! keeps every persisted message for the process lifetime, `Some(n)` gives
//! ring semantics where the oldest entry is dropped first. There is no
//! accidental unbounded growth — whoever constructs the hub chooses.

use std::collections::VecDeque;
use std::sync::Arc;

/// Ordered sequence of persisted messages.
pub struct Backlog {
    entries: VecDeque<Arc<str>>,
    cap: Option<usize>,
}

impl Backlog {
    /// Create a backlog with the given explicit bound.
    #[must_use]
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            cap,
        }
    }

    /// Append a message, evicting the oldest entry when at the cap.
    pub fn push(&mut self, message: Arc<str>) {
        if let Some(cap) = self.cap {
            if cap == 0 {
                return;
            }
            while self.entries.len() >= cap {
                let _ = self.entries.pop_front();
            }
        }
        self.entries.push_back(message);
    }

    /// Iterate entries in append order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<str>> {
        self.entries.iter()
    }

    /// Number of retained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the backlog holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
