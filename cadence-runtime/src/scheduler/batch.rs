//! Batch queue
//!
//! A batch is a list of tasks sharing one label. The batch tick takes up to
//! `batch_size` tasks at a time, spilling into the next batch when the front
//! one runs out, so a large batch never monopolises a tick. Progress is kept
//! per batch until its last task has executed.

use cadence_common::DeferredTask;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Tasks of one batch still waiting to run
pub(crate) struct PendingBatch {
    id: Uuid,
    label: String,
    tasks: VecDeque<DeferredTask>,
}

impl PendingBatch {
    pub(crate) fn new(label: impl Into<String>, tasks: Vec<DeferredTask>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            tasks: tasks.into(),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Execution progress of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BatchProgress {
    pub(crate) total: usize,
    pub(crate) completed: usize,
    pub(crate) failed: usize,
}

impl BatchProgress {
    pub(crate) fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

/// Slice of one batch taken by a tick
pub(crate) struct BatchChunk {
    pub(crate) batch_id: Uuid,
    pub(crate) label: String,
    pub(crate) total: usize,
    /// True when this chunk contains the batch's first task
    pub(crate) first: bool,
    pub(crate) tasks: Vec<DeferredTask>,
}

/// FIFO of batches with a bound on total pending tasks
pub(crate) struct BatchQueue {
    batches: VecDeque<PendingBatch>,
    progress: HashMap<Uuid, BatchProgress>,
    pending: usize,
    capacity: usize,
}

impl BatchQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            batches: VecDeque::new(),
            progress: HashMap::new(),
            pending: 0,
            capacity,
        }
    }

    /// Enqueue a whole batch, or hand it back if it does not fit
    pub(crate) fn push(&mut self, batch: PendingBatch) -> Result<(), PendingBatch> {
        if self.pending + batch.len() > self.capacity {
            return Err(batch);
        }
        self.pending += batch.len();
        self.progress.insert(
            batch.id,
            BatchProgress {
                total: batch.len(),
                completed: 0,
                failed: 0,
            },
        );
        self.batches.push_back(batch);
        Ok(())
    }

    /// Take up to `max` tasks from the front of the queue
    pub(crate) fn take(&mut self, max: usize) -> Vec<BatchChunk> {
        let mut chunks = Vec::new();
        let mut remaining = max;

        while remaining > 0 {
            let Some(front) = self.batches.front_mut() else {
                break;
            };

            let total = self
                .progress
                .get(&front.id)
                .map(|p| p.total)
                .unwrap_or(front.tasks.len());
            let first = front.tasks.len() == total;
            let n = remaining.min(front.tasks.len());
            let tasks: Vec<DeferredTask> = front.tasks.drain(..n).collect();

            remaining -= n;
            self.pending -= n;

            chunks.push(BatchChunk {
                batch_id: front.id,
                label: front.label.clone(),
                total,
                first,
                tasks,
            });

            if front.tasks.is_empty() {
                self.batches.pop_front();
            }
        }

        chunks
    }

    /// Record executed tasks for a batch
    ///
    /// Returns the updated progress, or `None` if the batch was cleared in
    /// the meantime. Finished batches are forgotten.
    pub(crate) fn record(
        &mut self,
        batch_id: Uuid,
        executed: usize,
        failed: usize,
    ) -> Option<BatchProgress> {
        let progress = self.progress.get_mut(&batch_id)?;
        progress.completed += executed;
        progress.failed += failed;
        let snapshot = progress.clone();
        if snapshot.is_finished() {
            self.progress.remove(&batch_id);
        }
        Some(snapshot)
    }

    /// Pending (not yet taken) tasks across all batches
    pub(crate) fn len(&self) -> usize {
        self.pending
    }

    pub(crate) fn clear(&mut self) -> usize {
        let n = self.pending;
        self.batches.clear();
        self.progress.clear();
        self.pending = 0;
        n
    }
}
