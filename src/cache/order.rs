//! Write Order Module
//!
//! Tracks keys in the order they were last written, for oldest-first eviction.
//!
//! Reads run under a shared lock and never reorder keys, so this is FIFO by
//! write time rather than LRU.

use std::collections::VecDeque;

// == Write Order ==
/// Keys ordered by last write: front = oldest, back = newest.
#[derive(Debug, Default)]
pub struct WriteOrder {
    order: VecDeque<String>,
}

impl WriteOrder {
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Record ==
    /// Marks `key` as the most recently written.
    pub fn record(&mut self, key: &str) {
        self.remove(key);
        self.order.push_back(key.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    // == Pop Oldest ==
    /// Removes and returns the oldest key other than `skip`.
    pub fn pop_oldest_except(&mut self, skip: &str) -> Option<String> {
        let position = self.order.iter().position(|k| k != skip)?;
        self.order.remove(position)
    }

    pub fn oldest(&self) -> Option<&String> {
        self.order.front()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }
}
