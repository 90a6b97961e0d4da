//! Immediate and delayed task queues
//!
//! Both are bounded binary heaps. Each entry carries a submission sequence
//! number so that equal keys pop in submission order.

use cadence_common::DeferredTask;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Heap entry for the immediate queue
struct ImmediateEntry {
    priority: i32,
    seq: u64,
    task: DeferredTask,
}

/// Higher priority first; among equal priorities, lower sequence first
impl Ord for ImmediateEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ImmediateEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ImmediateEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for ImmediateEntry {}

/// Priority queue drained one task per tick
pub(crate) struct ImmediateQueue {
    heap: BinaryHeap<ImmediateEntry>,
    capacity: usize,
}

impl ImmediateQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            capacity,
        }
    }

    /// Enqueue, or hand the task back when the queue is full
    pub(crate) fn push(&mut self, task: DeferredTask, seq: u64) -> Result<(), DeferredTask> {
        if self.heap.len() >= self.capacity {
            return Err(task);
        }
        self.heap.push(ImmediateEntry {
            priority: task.priority(),
            seq,
            task,
        });
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<DeferredTask> {
        self.heap.pop().map(|entry| entry.task)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Discard everything; returns how many tasks were dropped
    pub(crate) fn clear(&mut self) -> usize {
        let n = self.heap.len();
        self.heap.clear();
        n
    }
}

/// Heap entry for the delayed queue
struct DelayedEntry {
    deadline: Instant,
    seq: u64,
    task: DeferredTask,
}

/// Reverse ordering so the earliest deadline is the heap maximum
impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for DelayedEntry {}

/// Deadline-ordered queue; only tasks whose deadline has passed come out
pub(crate) struct DelayedQueue {
    heap: BinaryHeap<DelayedEntry>,
    capacity: usize,
}

impl DelayedQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, task: DeferredTask, seq: u64) -> Result<(), DeferredTask> {
        if self.heap.len() >= self.capacity {
            return Err(task);
        }
        self.heap.push(DelayedEntry {
            deadline: task.deadline(),
            seq,
            task,
        });
        Ok(())
    }

    /// Remove every task due at `now`, in deadline order
    pub(crate) fn pop_ready(&mut self, now: Instant) -> Vec<DeferredTask> {
        let mut ready = Vec::new();
        while self.heap.peek().is_some_and(|entry| entry.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                ready.push(entry.task);
            }
        }
        ready
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let n = self.heap.len();
        self.heap.clear();
        n
    }
}
