//! Deadline-ordered sleep queue
//!
//! Sleepers are kept sorted by `(wake_at, seq)`, where `seq` is the arrival
//! order. Two sleepers with the same deadline therefore wake in the order
//! they went to sleep.

use alloc::vec::Vec;

use crate::types::Tick;

/// One queued sleeper
#[derive(Debug, PartialEq, Eq)]
pub struct SleepEntry<W> {
    /// Tick at or after which the sleeper is due
    pub wake_at: Tick,
    /// Arrival order
    pub seq: u64,
    /// Opaque wakeup token
    pub waiter: W,
}

/// Sleep queue ordered by wake tick.
pub struct SleepQueue<W> {
    entries: Vec<SleepEntry<W>>,
    next_seq: u64,
}

impl<W> Default for SleepQueue<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> SleepQueue<W> {
    /// Empty queue
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// Number of sleepers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nobody sleeps
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest deadline, if any
    pub fn next_deadline(&self) -> Option<Tick> {
        self.entries.first().map(|e| e.wake_at)
    }

    /// Queue `waiter` to wake at `wake_at`. Returns its arrival sequence.
    pub fn insert(&mut self, wake_at: Tick, waiter: W) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        // Later arrivals sort after equal deadlines
        let pos = self.entries.partition_point(|e| e.wake_at <= wake_at);
        self.entries.insert(
            pos,
            SleepEntry {
                wake_at,
                seq,
                waiter,
            },
        );
        seq
    }

    /// Remove and return every sleeper due at `now`, in wake order.
    pub fn pop_due(&mut self, now: Tick) -> Vec<W> {
        let due = self.entries.partition_point(|e| e.wake_at <= now);
        self.entries.drain(..due).map(|e| e.waiter).collect()
    }

    /// Remove every sleeper regardless of deadline.
    pub fn drain_all(&mut self) -> Vec<W> {
        self.entries.drain(..).map(|e| e.waiter).collect()
    }

    /// Queued entries in wake order
    pub fn entries(&self) -> &[SleepEntry<W>] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_pop_due_in_deadline_order() {
        let mut q = SleepQueue::new();
        q.insert(5, 'a');
        q.insert(3, 'b');
        q.insert(4, 'c');

        assert_eq!(q.next_deadline(), Some(3));
        assert_eq!(q.pop_due(2), Vec::<char>::new());
        assert_eq!(q.pop_due(4), vec!['b', 'c']);
        assert_eq!(q.pop_due(10), vec!['a']);
        assert!(q.is_empty());
    }

    #[test]
    fn test_equal_deadlines_wake_in_arrival_order() {
        let mut q = SleepQueue::new();
        q.insert(7, 1);
        q.insert(7, 2);
        q.insert(6, 0);
        q.insert(7, 3);
        assert_eq!(q.pop_due(7), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_drain_all() {
        let mut q = SleepQueue::new();
        q.insert(100, 'x');
        q.insert(1, 'y');
        assert_eq!(q.drain_all(), vec!['y', 'x']);
        assert_eq!(q.len(), 0);
        assert_eq!(q.next_deadline(), None);
    }

    #[test]
    fn test_seq_increases() {
        let mut q = SleepQueue::new();
        let a = q.insert(1, ());
        let b = q.insert(1, ());
        assert!(b > a);
    }
}
