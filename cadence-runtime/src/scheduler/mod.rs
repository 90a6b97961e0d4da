//! Deferred Execution Scheduler
//!
//! Accepts closures from any thread and runs each exactly once on the
//! consumer thread.
//!
//! Three queues, each behind its own lock and drained by its own tick:
//! - **immediate**: priority ordered (higher first, FIFO on ties), one task per tick
//! - **delayed**: deadline ordered, every due task per tick
//! - **batch**: FIFO of labelled batches, up to `batch_size` tasks per tick
//!
//! Producers never block on the consumer: scheduling only holds a queue lock
//! long enough to push. A full queue drops the task and reports it through
//! the error handler; nothing is returned to the producer as a failure.
//! Closures run with no lock held, inside `catch_unwind`, so a failing task
//! only affects its own statistics.
//!
//! The tick functions (`process_immediate`, `process_delayed`,
//! `process_batch`) are public so that an embedding event loop can drive
//! them directly; [`crate::consumer::ConsumerLoop`] drives them on timers.

mod batch;
mod queues;
mod stats;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::ThreadId;
use std::time::Instant;

use cadence_common::config::SchedulerSettings;
use cadence_common::events::{SchedulerNotification, StatsSnapshot};
use cadence_common::task::describe_panic;
use cadence_common::{
    DeferredTask, Payload, Priority, TaskFailure, TaskResult, UiEvent, UiEventKind,
};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::sync::{lock, read, write};
use crate::ui_sink::UiSink;
use batch::{BatchChunk, BatchQueue, PendingBatch};
use queues::{DelayedQueue, ImmediateQueue};
use stats::StatsCollector;

/// Receives the formatted message for every failed or dropped task
pub type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Receives UI events of one kind on the consumer thread
pub type UiEventHandler = Arc<dyn Fn(&UiEvent) + Send + Sync>;

/// Broadcast capacity for scheduler notifications
const NOTIFICATION_CAPACITY: usize = 1000;

/// Source of per-instance scheduler ids
static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Id of the scheduler whose consumer loop owns the current task
    static CONSUMER_SCOPE: u64;
}

/// Scheduler construction parameters
#[derive(Clone, Default)]
pub struct SchedulerConfig {
    pub settings: SchedulerSettings,
    pub error_handler: Option<ErrorHandler>,
}

impl SchedulerConfig {
    pub fn from_settings(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            error_handler: None,
        }
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("settings", &self.settings)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

/// Outcome of [`Scheduler::execute_batch`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub executed: usize,
    pub failed: usize,
}

/// Cross-thread deferred execution scheduler
pub struct Scheduler {
    id: u64,
    settings: SchedulerSettings,
    immediate: Mutex<ImmediateQueue>,
    delayed: Mutex<DelayedQueue>,
    batches: Mutex<BatchQueue>,
    stats: Mutex<StatsCollector>,
    paused: AtomicBool,
    /// Submission counter; ties in both heaps break on it
    sequence: AtomicU64,
    error_handler: RwLock<Option<ErrorHandler>>,
    ui_handlers: Arc<RwLock<HashMap<UiEventKind, Vec<UiEventHandler>>>>,
    consumer_thread: Mutex<Option<ThreadId>>,
    notify_tx: broadcast::Sender<SchedulerNotification>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let settings = sanitize(config.settings);
        let capacity = settings.max_queue_size;

        info!(
            "Scheduler initialized: update={}ms, delayed={}ms, batch={}ms x{}, max_queue={}",
            settings.update_interval_ms,
            settings.delayed_interval_ms,
            settings.batch_interval_ms,
            settings.batch_size,
            capacity
        );

        Self {
            id: NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed),
            immediate: Mutex::new(ImmediateQueue::new(capacity)),
            delayed: Mutex::new(DelayedQueue::new(capacity)),
            batches: Mutex::new(BatchQueue::new(capacity)),
            stats: Mutex::new(StatsCollector::new()),
            paused: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            error_handler: RwLock::new(config.error_handler),
            ui_handlers: Arc::new(RwLock::new(HashMap::new())),
            consumer_thread: Mutex::new(None),
            notify_tx,
            settings,
        }
    }

    /// Scheduler with default settings and no error handler
    pub fn with_defaults() -> Self {
        Self::new(SchedulerConfig::default())
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Replace the error handler
    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *write(&self.error_handler) = Some(handler);
    }

    /// Subscribe to scheduler notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerNotification> {
        self.notify_tx.subscribe()
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Queue a closure for the next immediate ticks
    pub fn schedule_immediate<F>(&self, label: impl Into<String>, priority: i32, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_task(DeferredTask::new(label, priority, action));
    }

    /// Queue a closure to run no earlier than `delay_ms` from now
    pub fn schedule_delayed<F>(
        &self,
        label: impl Into<String>,
        delay_ms: u64,
        priority: i32,
        action: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        let task = DeferredTask::new(label, priority, action)
            .with_delay(std::time::Duration::from_millis(delay_ms));
        self.schedule_task(task);
    }

    /// Queue a prepared task; delayed tasks go to the delayed queue
    pub fn schedule_task(&self, task: DeferredTask) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let label = task.label().to_string();
        let priority = task.priority();
        let delay_ms = task.delay_ms();

        let (queue_name, result) = if task.is_delayed() {
            ("delayed", lock(&self.delayed).push(task, seq))
        } else {
            ("immediate", lock(&self.immediate).push(task, seq))
        };

        match result {
            Ok(()) => {
                trace!("Scheduled '{}' ({} queue, priority {})", label, queue_name, priority);
                self.notify(SchedulerNotification::TaskScheduled {
                    label,
                    priority,
                    delay_ms,
                    timestamp: Utc::now(),
                });
            }
            Err(rejected) => self.report_dropped(rejected.label(), queue_name, 1),
        }
    }

    /// Queue a list of closures under one label
    pub fn schedule_batch<I, F>(&self, label: impl Into<String>, actions: I)
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() + Send + 'static,
    {
        let label = label.into();
        let tasks = actions
            .into_iter()
            .enumerate()
            .map(|(i, action)| DeferredTask::new(format!("{}[{}]", label, i), Priority::NORMAL, action))
            .collect();
        self.submit_batch(label, tasks);
    }

    /// Queue prepared tasks as one batch
    ///
    /// The batch is accepted or dropped as a whole.
    pub fn submit_batch(&self, label: impl Into<String>, tasks: Vec<DeferredTask>) {
        let label = label.into();
        if tasks.is_empty() {
            debug!("Ignoring empty batch '{}'", label);
            return;
        }

        let count = tasks.len();
        let batch = PendingBatch::new(label.clone(), tasks);
        let batch_id = batch.id();
        let result = lock(&self.batches).push(batch);

        match result {
            Ok(()) => {
                debug!("Scheduled batch '{}' ({} tasks, id {})", label, count, batch_id);
                self.notify(SchedulerNotification::TaskScheduled {
                    label,
                    priority: Priority::NORMAL,
                    delay_ms: 0,
                    timestamp: Utc::now(),
                });
            }
            Err(rejected) => {
                self.report_dropped(rejected.label(), "batch", rejected.len() as u64)
            }
        }
    }

    /// Run `action` now if called on the consumer thread, otherwise queue it
    pub fn invoke<F>(&self, label: impl Into<String>, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let task = DeferredTask::new(label, Priority::NORMAL, action);
        if self.is_consumer_thread() {
            let _ = self.execute_one(task);
        } else {
            self.schedule_task(task);
        }
    }

    // ========================================================================
    // UI events
    // ========================================================================

    /// Register a handler for one kind of UI event
    pub fn add_ui_handler(&self, kind: UiEventKind, handler: UiEventHandler) {
        write(&self.ui_handlers).entry(kind).or_default().push(handler);
    }

    /// Turn a UI event into an immediate dispatch on the consumer thread
    ///
    /// Handlers for the event's kind run inside the dispatch task, each
    /// isolated from the others, then the event is broadcast as
    /// [`SchedulerNotification::UiEvent`]. A panicking handler fails the
    /// dispatch task, which reports it like any other task failure.
    pub fn handle_ui_event(&self, event: UiEvent) {
        let handlers = Arc::clone(&self.ui_handlers);
        let notify_tx = self.notify_tx.clone();
        let label = format!("ui:{}", event.label);
        let priority = event.priority;

        self.schedule_task(DeferredTask::fallible(label, priority, move || {
            let targets: Vec<UiEventHandler> = read(&handlers)
                .get(&event.kind)
                .cloned()
                .unwrap_or_default();

            let failures: Vec<String> = targets
                .iter()
                .filter_map(|handler| {
                    catch_unwind(AssertUnwindSafe(|| handler(&event)))
                        .err()
                        .map(|payload| describe_panic(payload.as_ref()))
                })
                .collect();

            let kind = event.kind;
            let _ = notify_tx.send(SchedulerNotification::UiEvent { event });

            if failures.is_empty() {
                Ok(())
            } else {
                Err(TaskFailure::failed(format!(
                    "{} UI handler(s) for {:?} panicked: {}",
                    failures.len(),
                    kind,
                    failures.join("; ")
                )))
            }
        }));
    }

    /// Post a status line for the UI
    pub fn post_status(&self, message: impl Into<String>) {
        let message = message.into();
        self.handle_ui_event(UiEvent::new(UiEventKind::Status, "status", Payload::Text(message)));
    }

    /// Post progress of a long-running operation
    pub fn post_progress(&self, label: impl Into<String>, percent: u8) {
        let label = label.into();
        let payload = Payload::progress(percent, label.clone());
        self.handle_ui_event(UiEvent::new(UiEventKind::Progress, label, payload));
    }

    /// Post an error message for the UI (high priority)
    pub fn post_error(&self, message: impl Into<String>) {
        let event = UiEvent::new(UiEventKind::Error, "error", Payload::Text(message.into()))
            .with_priority(Priority::HIGH);
        self.handle_ui_event(event);
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute one task on the calling thread
    ///
    /// Never panics and never propagates the task's failure beyond the
    /// returned result.
    pub fn execute_one(&self, task: DeferredTask) -> TaskResult {
        let label = task.label().to_string();
        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| task.run()))
            .unwrap_or_else(|payload| Err(TaskFailure::from_panic(payload)));
        let elapsed = start.elapsed();

        match &outcome {
            Ok(()) => {
                lock(&self.stats).record_success(elapsed);
                trace!("Task '{}' completed in {:?}", label, elapsed);
                self.notify(SchedulerNotification::TaskProcessed {
                    label,
                    elapsed_ms: cadence_common::time::as_millis_f64(elapsed),
                    timestamp: Utc::now(),
                });
            }
            Err(failure) => {
                lock(&self.stats).record_failure();
                let message = format!("Task '{}' failed: {}", label, failure);
                warn!("{}", message);
                self.report_error(&message);
                self.notify(SchedulerNotification::TaskFailed {
                    label,
                    message,
                    timestamp: Utc::now(),
                });
            }
        }

        outcome
    }

    /// Execute tasks in order; a failure does not stop the rest
    pub fn execute_batch(&self, tasks: Vec<DeferredTask>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for task in tasks {
            if self.execute_one(task).is_err() {
                outcome.failed += 1;
            }
            outcome.executed += 1;
        }
        outcome
    }

    /// Immediate tick: run the highest-priority task, if any
    ///
    /// Returns whether a task ran.
    pub fn process_immediate(&self) -> bool {
        if self.is_paused() {
            return false;
        }
        let next = lock(&self.immediate).pop();
        match next {
            Some(task) => {
                let _ = self.execute_one(task);
                true
            }
            None => false,
        }
    }

    /// Delayed tick: run every task whose deadline has passed
    pub fn process_delayed(&self) -> usize {
        self.process_delayed_at(Instant::now())
    }

    /// Delayed tick against an explicit clock reading
    pub fn process_delayed_at(&self, now: Instant) -> usize {
        if self.is_paused() {
            return 0;
        }
        let ready = lock(&self.delayed).pop_ready(now);
        let count = ready.len();
        if count > 0 {
            trace!("Delayed tick: {} task(s) due", count);
        }
        for task in ready {
            let _ = self.execute_one(task);
        }
        count
    }

    /// Batch tick: run up to `batch_size` batched tasks
    ///
    /// Returns how many tasks ran.
    pub fn process_batch(&self) -> usize {
        if self.is_paused() {
            return 0;
        }
        let chunks = lock(&self.batches).take(self.settings.batch_size);
        let mut executed = 0;
        for chunk in chunks {
            executed += self.run_chunk(chunk);
        }
        executed
    }

    fn run_chunk(&self, chunk: BatchChunk) -> usize {
        let BatchChunk {
            batch_id,
            label,
            total,
            first,
            tasks,
        } = chunk;

        if first {
            debug!("Batch '{}' started ({} tasks)", label, total);
            self.notify(SchedulerNotification::BatchStarted {
                batch_id,
                label: label.clone(),
                total,
                timestamp: Utc::now(),
            });
        }

        let outcome = self.execute_batch(tasks);
        let progress = lock(&self.batches).record(batch_id, outcome.executed, outcome.failed);

        if let Some(progress) = progress {
            self.notify(SchedulerNotification::BatchProgress {
                batch_id,
                label: label.clone(),
                completed: progress.completed,
                total: progress.total,
                timestamp: Utc::now(),
            });
            if progress.is_finished() {
                debug!(
                    "Batch '{}' finished: {} tasks, {} failed",
                    label, progress.total, progress.failed
                );
                self.notify(SchedulerNotification::BatchFinished {
                    batch_id,
                    label,
                    total: progress.total,
                    failed: progress.failed,
                    timestamp: Utc::now(),
                });
            }
        }

        outcome.executed
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Stop draining all queues; pending tasks are kept
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("Scheduler paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("Scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Discard pending immediate tasks; returns how many
    pub fn clear_immediate(&self) -> usize {
        let n = lock(&self.immediate).clear();
        if n > 0 {
            info!("Cleared {} immediate task(s)", n);
        }
        n
    }

    pub fn clear_delayed(&self) -> usize {
        let n = lock(&self.delayed).clear();
        if n > 0 {
            info!("Cleared {} delayed task(s)", n);
        }
        n
    }

    pub fn clear_batch(&self) -> usize {
        let n = lock(&self.batches).clear();
        if n > 0 {
            info!("Cleared {} batched task(s)", n);
        }
        n
    }

    /// Discard everything pending in all three queues
    pub fn clear_all(&self) -> usize {
        self.clear_immediate() + self.clear_delayed() + self.clear_batch()
    }

    // ========================================================================
    // Consumer thread identity
    // ========================================================================

    /// Run `fut` as this scheduler's consumer context
    ///
    /// Code polled inside the returned future sees `is_consumer_thread()`
    /// as true, whichever runtime worker happens to poll it. Other tasks on
    /// the same worker do not.
    pub fn consumer_scope<F: Future>(&self, fut: F) -> impl Future<Output = F::Output> {
        CONSUMER_SCOPE.scope(self.id, fut)
    }

    /// Declare the calling OS thread to be the consumer thread
    ///
    /// Only for a thread dedicated to the consumer (see
    /// [`crate::consumer::ConsumerLoop::spawn_thread`]); on a shared runtime
    /// worker use [`Scheduler::consumer_scope`] instead.
    pub fn bind_consumer_thread(&self) {
        let id = std::thread::current().id();
        *lock(&self.consumer_thread) = Some(id);
        debug!("Consumer thread bound: {:?}", id);
    }

    pub fn unbind_consumer_thread(&self) {
        *lock(&self.consumer_thread) = None;
    }

    /// True inside this scheduler's consumer scope or on its bound thread
    pub fn is_consumer_thread(&self) -> bool {
        let in_scope = CONSUMER_SCOPE
            .try_with(|id| *id == self.id)
            .unwrap_or(false);
        in_scope || *lock(&self.consumer_thread) == Some(std::thread::current().id())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn pending_immediate(&self) -> usize {
        lock(&self.immediate).len()
    }

    pub fn pending_delayed(&self) -> usize {
        lock(&self.delayed).len()
    }

    pub fn pending_batch(&self) -> usize {
        lock(&self.batches).len()
    }

    /// Earliest deadline in the delayed queue
    pub fn next_delayed_deadline(&self) -> Option<Instant> {
        lock(&self.delayed).next_deadline()
    }

    pub fn statistics(&self) -> StatsSnapshot {
        let pending = (
            self.pending_immediate(),
            self.pending_delayed(),
            self.pending_batch(),
        );
        lock(&self.stats).snapshot(pending)
    }

    pub fn reset_statistics(&self) {
        lock(&self.stats).reset();
        debug!("Scheduler statistics reset");
    }

    /// Broadcast a statistics snapshot and return it
    pub fn emit_statistics(&self) -> StatsSnapshot {
        let stats = self.statistics();
        debug!(
            "Scheduler stats: processed={}, failed={}, dropped={}, pending={}, avg={:.3}ms",
            stats.processed,
            stats.failed,
            stats.dropped,
            stats.total_pending(),
            stats.avg_latency_ms
        );
        self.notify(SchedulerNotification::Statistics {
            stats: stats.clone(),
            timestamp: Utc::now(),
        });
        stats
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn report_dropped(&self, label: &str, queue: &str, count: u64) {
        lock(&self.stats).record_dropped(count);
        let message = format!(
            "Task '{}' dropped: {} queue full (max {} pending)",
            label, queue, self.settings.max_queue_size
        );
        warn!("{}", message);
        self.report_error(&message);
        self.notify(SchedulerNotification::TaskDropped {
            label: label.to_string(),
            queue: queue.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn report_error(&self, message: &str) {
        let Some(handler) = read(&self.error_handler).clone() else {
            error!("{}", message);
            return;
        };
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(message))) {
            error!(
                "Error handler panicked ({}) while reporting: {}",
                describe_panic(payload.as_ref()),
                message
            );
        }
    }

    fn notify(&self, notification: SchedulerNotification) {
        // No subscribers is fine
        let _ = self.notify_tx.send(notification);
    }
}

/// Settings the queues cannot work with are raised to the smallest usable value
fn sanitize(mut settings: SchedulerSettings) -> SchedulerSettings {
    if settings.batch_size == 0 {
        warn!("scheduler batch_size 0 would never drain batches, using 1");
        settings.batch_size = 1;
    }
    if settings.max_queue_size == 0 {
        warn!("scheduler max_queue_size 0 would drop every task, using 1");
        settings.max_queue_size = 1;
    }
    settings
}

impl UiSink for Scheduler {
    fn post_ui_event(&self, event: UiEvent) {
        self.handle_ui_event(event);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.settings)
            .field("paused", &self.is_paused())
            .field("pending_immediate", &self.pending_immediate())
            .field("pending_delayed", &self.pending_delayed())
            .field("pending_batch", &self.pending_batch())
            .finish_non_exhaustive()
    }
}
