//! Shared work-claiming counter.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Atomic cursor handing out item indices exactly once each.
///
/// Shared by reference across all workers of one run. `claim` never blocks:
/// it is a single fetch-and-increment checked against the item count.
pub struct WorkCounter {
    next: AtomicUsize,
    limit: usize,
}

impl WorkCounter {
    /// Counter over the indices `0..limit`.
    pub fn new(limit: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            limit,
        }
    }

    /// Claim the next unclaimed index, or `None` once all are handed out.
    pub fn claim(&self) -> Option<usize> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.limit).then_some(index)
    }

    /// Number of claimable indices.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_sequential_claims_then_exhausted() {
        let counter = WorkCounter::new(3);
        assert_eq!(counter.claim(), Some(0));
        assert_eq!(counter.claim(), Some(1));
        assert_eq!(counter.claim(), Some(2));
        assert_eq!(counter.claim(), None);
        assert_eq!(counter.claim(), None);
    }

    #[test]
    fn test_empty_counter_is_exhausted_immediately() {
        let counter = WorkCounter::new(0);
        assert_eq!(counter.claim(), None);
    }

    #[test]
    fn test_concurrent_claims_are_unique_and_complete() {
        // Deliberately oversubscribed: far more claimants than a sane pool
        // width, to shake out double-handouts.
        const ITEMS: usize = 10_000;
        const CLAIMANTS: usize = 32;

        let counter = WorkCounter::new(ITEMS);
        let mut per_thread: Vec<Vec<usize>> = Vec::new();

        thread::scope(|scope| {
            let handles: Vec<_> = (0..CLAIMANTS)
                .map(|_| {
                    scope.spawn(|| {
                        let mut claimed = Vec::new();
                        while let Some(index) = counter.claim() {
                            claimed.push(index);
                        }
                        claimed
                    })
                })
                .collect();
            for handle in handles {
                per_thread.push(handle.join().unwrap());
            }
        });

        let mut seen = HashSet::new();
        for claimed in &per_thread {
            for &index in claimed {
                assert!(index < ITEMS);
                assert!(seen.insert(index), "index {index} handed out twice");
            }
        }
        assert_eq!(seen.len(), ITEMS, "some indices were skipped");
        assert_eq!(counter.claim(), None);
    }
}
