//! Time-keyed task queue processed by the tick driver.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Deferred work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledTask {
    /// Bring back an absorbed bot under its old name.
    RespawnBot { name: String },
}

#[derive(Debug)]
struct Entry {
    due: u64,
    seq: u64,
    task: ScheduledTask,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Tasks ordered by due time, then by insertion order.
#[derive(Debug, Default)]
pub struct Schedule {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` to run once the clock reaches `due` (ms).
    pub fn push(&mut self, due: u64, task: ScheduledTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { due, seq, task }));
    }

    /// Remove and return every task due at or before `now`, in order.
    pub fn drain_due(&mut self, now: u64) -> Vec<ScheduledTask> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|Reverse(e)| e.due <= now) {
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry.task);
            }
        }
        due
    }

    /// Due time of the earliest task.
    pub fn next_due(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(e)| e.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn respawn(name: &str) -> ScheduledTask {
        ScheduledTask::RespawnBot { name: name.to_string() }
    }

    #[test]
    fn test_drains_in_due_order() {
        let mut schedule = Schedule::new();
        schedule.push(300, respawn("c"));
        schedule.push(100, respawn("a"));
        schedule.push(200, respawn("b"));
        assert_eq!(schedule.next_due(), Some(100));
        assert!(schedule.drain_due(99).is_empty());
        assert_eq!(schedule.drain_due(200), vec![respawn("a"), respawn("b")]);
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.drain_due(1000), vec![respawn("c")]);
        assert!(schedule.is_empty());
    }

    #[test]
    fn test_equal_due_keeps_insertion_order() {
        let mut schedule = Schedule::new();
        for name in ["x", "y", "z"] {
            schedule.push(50, respawn(name));
        }
        assert_eq!(schedule.drain_due(50), vec![respawn("x"), respawn("y"), respawn("z")]);
    }
}
