//! Per-exercise retry counters.

use std::collections::HashMap;

/// Attempt counts keyed by exercise index
///
/// Counts only grow until [`reset`](AttemptTracker::reset) clears them.
#[derive(Clone, Debug, Default)]
pub struct AttemptTracker {
    counts: HashMap<usize, u32>,
}

impl AttemptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failed attempt and return the updated count
    pub fn record_attempt(&mut self, index: usize) -> u32 {
        let count = self.counts.entry(index).or_insert(0);
        *count += 1;
        tracing::debug!("Exercise {} attempt count now {}", index, count);
        *count
    }

    pub fn reset(&mut self, index: usize) {
        self.counts.remove(&index);
    }

    pub fn count_for(&self, index: usize) -> u32 {
        self.counts.get(&index).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_entries_start_at_zero() {
        let mut tracker = AttemptTracker::new();
        assert_eq!(tracker.count_for(4), 0);
        assert_eq!(tracker.record_attempt(4), 1);
        assert_eq!(tracker.record_attempt(4), 2);
        assert_eq!(tracker.count_for(4), 2);
        assert_eq!(tracker.count_for(5), 0);
    }

    #[test]
    fn test_reset_clears_single_entry() {
        let mut tracker = AttemptTracker::new();
        tracker.record_attempt(0);
        tracker.record_attempt(1);
        tracker.reset(0);

        assert_eq!(tracker.count_for(0), 0);
        assert_eq!(tracker.count_for(1), 1);
        assert_eq!(tracker.record_attempt(0), 1);
    }
}
