//! Capped FIFO buffer.
//!
//! Backs both the observation window and the telemetry log: pushes go to the tail
//! and, once the cap is exceeded, the oldest entries fall off the head. Overflow is
//! not an error.

use std::collections::VecDeque;

/// Ordered sequence holding at most `capacity` items.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// Create an empty buffer.
    ///
    /// # Panics
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedBuffer capacity must be > 0");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append to the tail, evicting from the head until the cap holds.
    ///
    /// Returns how many items were evicted.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Drop everything and refill from `items`, keeping only the newest `capacity`.
    pub fn replace<I: IntoIterator<Item = T>>(&mut self, items: I) {
        self.items.clear();
        for item in items {
            self.push(item);
        }
    }

    /// Number of retained items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` when nothing is retained.
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// Owned copy of the contents in order.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Owned copy of the newest `n` items (fewer if shorter), oldest first.
    pub fn tail(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }
}
