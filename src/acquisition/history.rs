use std::collections::VecDeque;
use std::num::NonZeroUsize;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::models::Reading;
use crate::sync::lock_bounded;

/// Bounded, acquisition-ordered history of readings.
///
/// Once full, every append evicts the oldest entry. The capacity is fixed
/// at construction and the buffer never grows past it.
#[derive(Debug)]
pub struct HistoryRingBuffer {
    entries: Mutex<VecDeque<Arc<Reading>>>,
    capacity: usize,
}

impl HistoryRingBuffer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        HistoryRingBuffer {
            entries: Mutex::new(VecDeque::with_capacity(capacity.get())),
            capacity: capacity.get(),
        }
    }

    pub fn append(&self, reading: Arc<Reading>) {
        let mut entries = lock_bounded(&self.entries, "history");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(reading);
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Reading>> {
        lock_bounded(&self.entries, "history").iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock_bounded(&self.entries, "history").len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::snapshot::tests::numbered_reading;
    use std::thread;

    fn buffer(capacity: usize) -> HistoryRingBuffer {
        HistoryRingBuffer::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn sequences(history: &HistoryRingBuffer) -> Vec<u64> {
        history.snapshot().iter().map(|r| r.sequence).collect()
    }

    #[test]
    fn keeps_last_n_in_order() {
        let history = buffer(4);
        for n in 1..=5 {
            history.append(numbered_reading(n));
        }
        assert_eq!(history.len(), 4);
        assert_eq!(sequences(&history), vec![2, 3, 4, 5]);
    }

    #[test]
    fn partial_fill_keeps_everything() {
        let history = buffer(10);
        for n in 1..=3 {
            history.append(numbered_reading(n));
        }
        assert_eq!(sequences(&history), vec![1, 2, 3]);
        assert_eq!(history.capacity(), 10);
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let history = buffer(2);
        history.append(numbered_reading(1));
        let before = history.snapshot();
        history.append(numbered_reading(2));
        history.append(numbered_reading(3));
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].sequence, 1);
    }

    #[test]
    fn concurrent_snapshots_are_ordered_and_bounded() {
        let history = buffer(64);
        thread::scope(|scope| {
            scope.spawn(|| {
                for n in 1..=5_000 {
                    history.append(numbered_reading(n));
                }
            });
            for _ in 0..3 {
                scope.spawn(|| {
                    for _ in 0..2_000 {
                        let seen = sequences(&history);
                        assert!(seen.len() <= 64);
                        assert!(seen.windows(2).all(|w| w[1] == w[0] + 1));
                    }
                });
            }
        });
        assert_eq!(sequences(&history).last(), Some(&5_000));
    }
}
