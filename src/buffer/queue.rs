use super::error::{BufferError, OverflowError};
use super::metrics::BufferState;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;

// Prevent excessive memory allocation
const MAX_CAPACITY: usize = 100_000_000;

/// Rule applied when a push arrives while the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued item to make room.
    #[default]
    DiscardOldest,
    /// Refuse the incoming item and count the overflow.
    DiscardNewest,
    /// Fail the push with `OverflowError`.
    Reject,
}

impl OverflowPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            OverflowPolicy::DiscardOldest => "discard_oldest",
            OverflowPolicy::DiscardNewest => "discard_newest",
            OverflowPolicy::Reject => "reject",
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "discard_oldest" => Ok(OverflowPolicy::DiscardOldest),
            "discard_newest" => Ok(OverflowPolicy::DiscardNewest),
            "reject" => Ok(OverflowPolicy::Reject),
            other => Err(format!(
                "Invalid overflow policy '{other}'. \
                 Valid values: discard_oldest, discard_newest, reject"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl QueueConfig {
    pub fn new(capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        Self {
            capacity,
            overflow_policy,
        }
    }
}

/// Bounded FIFO with a configurable overflow policy.
///
/// Items are kept oldest first. The queue does no I/O and no locking; callers
/// that share it wrap it in their own lock.
#[derive(Debug, Clone)]
pub struct FixedCapacityQueue<T> {
    items: VecDeque<T>,
    config: QueueConfig,
    overflow_count: u64,
    evicted_count: u64,
}

impl<T> FixedCapacityQueue<T> {
    pub fn new(config: QueueConfig) -> Result<Self, BufferError> {
        if config.capacity == 0 || config.capacity > MAX_CAPACITY {
            return Err(BufferError::InvalidCapacity {
                capacity: config.capacity,
            });
        }

        Ok(Self {
            // Grows on demand; large capacities are mostly never reached
            items: VecDeque::with_capacity(config.capacity.min(1024)),
            config,
            overflow_count: 0,
            evicted_count: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.config.overflow_policy
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.config.capacity
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Appends `item`, applying the overflow policy when at capacity.
    ///
    /// Returns `Ok(true)` when the item was admitted and `Ok(false)` when it
    /// was discarded under `DiscardNewest`.
    pub fn push(&mut self, item: T) -> Result<bool, OverflowError> {
        if self.is_full() {
            match self.config.overflow_policy {
                OverflowPolicy::DiscardOldest => {
                    self.items.pop_front();
                    self.evicted_count += 1;
                }
                OverflowPolicy::DiscardNewest => {
                    self.overflow_count += 1;
                    return Ok(false);
                }
                OverflowPolicy::Reject => {
                    return Err(OverflowError {
                        capacity: self.config.capacity,
                    });
                }
            }
        }

        self.items.push_back(item);
        Ok(true)
    }

    pub fn pop_oldest(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Takes every item oldest first and leaves the queue empty.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    /// Keeps only the items matching `keep`, preserving order.
    /// Returns the number of removed items.
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.items.len();
        self.items.retain(keep);
        before - self.items.len()
    }

    /// Empties the queue. Counters are kept.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn reset_overflow_count(&mut self) {
        self.overflow_count = 0;
        self.evicted_count = 0;
    }

    pub fn state(&self) -> BufferState {
        BufferState {
            size: self.items.len(),
            capacity: self.config.capacity,
            overflow_count: self.overflow_count,
            evicted_count: self.evicted_count,
        }
    }
}

impl<T: Clone> FixedCapacityQueue<T> {
    /// Copies the current contents oldest first without removing them.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize, policy: OverflowPolicy) -> FixedCapacityQueue<char> {
        FixedCapacityQueue::new(QueueConfig::new(capacity, policy)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_capacity() {
        let zero = FixedCapacityQueue::<u8>::new(QueueConfig::new(0, OverflowPolicy::Reject));
        assert_eq!(
            zero.unwrap_err(),
            BufferError::InvalidCapacity { capacity: 0 }
        );

        let huge = FixedCapacityQueue::<u8>::new(QueueConfig::new(
            MAX_CAPACITY + 1,
            OverflowPolicy::Reject,
        ));
        assert!(huge.is_err());
    }

    #[test]
    fn test_discard_oldest_keeps_latest_items() {
        let mut q = queue(3, OverflowPolicy::DiscardOldest);
        for c in ['A', 'B', 'C', 'D'] {
            assert_eq!(q.push(c), Ok(true));
        }

        assert_eq!(q.snapshot(), vec!['B', 'C', 'D']);
        assert_eq!(q.overflow_count(), 0);
        assert_eq!(q.state().evicted_count, 1);
    }

    #[test]
    fn test_discard_oldest_last_c_items_for_many_pushes() {
        let capacity = 5;
        let mut q = FixedCapacityQueue::new(QueueConfig::new(
            capacity,
            OverflowPolicy::DiscardOldest,
        ))
        .unwrap();

        for n in (capacity + 1)..40 {
            q.clear();
            for i in 0..n {
                q.push(i).unwrap();
            }
            let expected: Vec<usize> = (n - capacity..n).collect();
            assert_eq!(q.snapshot(), expected, "after {n} pushes");
        }
    }

    #[test]
    fn test_discard_newest_refuses_incoming() {
        let mut q = queue(2, OverflowPolicy::DiscardNewest);
        q.push('A').unwrap();
        q.push('B').unwrap();

        assert_eq!(q.push('C'), Ok(false));
        assert_eq!(q.overflow_count(), 1);
        assert_eq!(q.snapshot(), vec!['A', 'B']);

        assert_eq!(q.push('D'), Ok(false));
        assert_eq!(q.overflow_count(), 2);
    }

    #[test]
    fn test_reject_policy_errors_and_preserves_contents() {
        let mut q = queue(2, OverflowPolicy::Reject);
        q.push('A').unwrap();
        q.push('B').unwrap();

        assert_eq!(q.push('C'), Err(OverflowError { capacity: 2 }));
        assert_eq!(q.snapshot(), vec!['A', 'B']);
        assert_eq!(q.overflow_count(), 0);
    }

    #[test]
    fn test_pop_oldest_is_fifo() {
        let mut q = queue(3, OverflowPolicy::Reject);
        assert_eq!(q.pop_oldest(), None);

        q.push('A').unwrap();
        q.push('B').unwrap();
        assert_eq!(q.pop_oldest(), Some('A'));
        assert_eq!(q.pop_oldest(), Some('B'));
        assert_eq!(q.pop_oldest(), None);
    }

    #[test]
    fn test_drain_then_repush_reproduces_snapshot() {
        let mut q = queue(4, OverflowPolicy::DiscardOldest);
        for c in ['A', 'B', 'C', 'D', 'E'] {
            q.push(c).unwrap();
        }
        let before = q.snapshot();

        let drained = q.drain_all();
        assert!(q.is_empty());
        assert_eq!(drained, before);

        for c in drained {
            q.push(c).unwrap();
        }
        assert_eq!(q.snapshot(), before);
    }

    #[test]
    fn test_clear_keeps_overflow_count() {
        let mut q = queue(1, OverflowPolicy::DiscardNewest);
        q.push('A').unwrap();
        q.push('B').unwrap();
        q.clear();

        assert!(q.is_empty());
        assert_eq!(q.overflow_count(), 1);

        q.reset_overflow_count();
        assert_eq!(q.overflow_count(), 0);
    }

    #[test]
    fn test_retain_preserves_order() {
        let mut q = queue(5, OverflowPolicy::Reject);
        for c in ['A', 'b', 'C', 'd'] {
            q.push(c).unwrap();
        }

        let removed = q.retain(|c| c.is_uppercase());
        assert_eq!(removed, 2);
        assert_eq!(q.snapshot(), vec!['A', 'C']);
    }

    #[test]
    fn test_state_reports_fill() {
        let mut q = queue(4, OverflowPolicy::Reject);
        q.push('A').unwrap();
        let state = q.state();

        assert_eq!(state.size, 1);
        assert_eq!(state.capacity, 4);
        assert!((state.fill_ratio() - 0.25).abs() < f64::EPSILON);
        assert!(!state.is_full());
    }

    #[test]
    fn test_overflow_policy_parsing() {
        assert_eq!(
            "discard-oldest".parse::<OverflowPolicy>(),
            Ok(OverflowPolicy::DiscardOldest)
        );
        assert_eq!(
            "DISCARD_NEWEST".parse::<OverflowPolicy>(),
            Ok(OverflowPolicy::DiscardNewest)
        );
        assert_eq!("reject".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Reject));
        assert!("drop".parse::<OverflowPolicy>().is_err());
    }
}
