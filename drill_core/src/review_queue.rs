//! Deferred exercises awaiting the review pass.

use std::collections::VecDeque;

/// FIFO of exercise indices with set semantics on insertion
#[derive(Clone, Debug, Default)]
pub struct ReviewQueue {
    items: VecDeque<usize>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `index` unless it is already queued
    ///
    /// Returns true if the index was added.
    pub fn enqueue(&mut self, index: usize) -> bool {
        if self.contains(index) {
            return false;
        }
        self.items.push_back(index);
        tracing::debug!("Deferred exercise {} to review ({} queued)", index, self.items.len());
        true
    }

    pub fn dequeue_first(&mut self) -> Option<usize> {
        self.items.pop_front()
    }

    /// Drop `index` wherever it sits
    pub fn remove(&mut self, index: usize) {
        self.items.retain(|&i| i != index);
    }

    /// Drop every index the predicate reports as already completed
    ///
    /// Must run before the review pass starts; an index can be queued
    /// speculatively and then resolved by a different path.
    pub fn filter_still_pending<F>(&mut self, is_completed: F) -> usize
    where
        F: Fn(usize) -> bool,
    {
        let before = self.items.len();
        self.items.retain(|&i| !is_completed(i));
        let removed = before - self.items.len();
        if removed > 0 {
            tracing::debug!("Dropped {} resolved exercises from review queue", removed);
        }
        removed
    }

    pub fn contains(&self, index: usize) -> bool {
        self.items.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_is_idempotent_and_fifo() {
        let mut queue = ReviewQueue::new();
        assert!(queue.enqueue(2));
        assert!(queue.enqueue(0));
        assert!(!queue.enqueue(2));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue_first(), Some(2));
        assert_eq!(queue.dequeue_first(), Some(0));
        assert_eq!(queue.dequeue_first(), None);
    }

    #[test]
    fn test_filter_removes_phantom_items() {
        let mut queue = ReviewQueue::new();
        for i in [1, 3, 5] {
            queue.enqueue(i);
        }

        let removed = queue.filter_still_pending(|i| i == 3);
        assert_eq!(removed, 1);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![1, 5]);
    }
}
