//! Deferred task value type
//!
//! A `DeferredTask` is a closure plus its bookkeeping (label, priority,
//! creation time, optional delay). Tasks are created on any producer thread
//! and executed exactly once on the consumer thread. Once constructed, a task
//! is immutable: the only thing that can be done with it is to hand it to a
//! queue and eventually [`DeferredTask::run`] it.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Outcome of a single task invocation
pub type TaskResult = std::result::Result<(), TaskFailure>;

/// Boxed closure stored inside a task
type Action = Box<dyn FnOnce() -> TaskResult + Send + 'static>;

/// Why a task did not complete normally
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The closure reported a failure through its return value
    #[error("{0}")]
    Failed(String),

    /// The closure panicked; the payload is the panic message
    #[error("panicked: {0}")]
    Panicked(String),
}

impl TaskFailure {
    /// Build a failure from anything printable
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }

    /// Build a failure from a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(describe_panic(payload.as_ref()))
    }
}

/// Extract a readable message from a panic payload
pub fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Conventional priority levels
///
/// Priorities are plain integers; higher values drain first. These constants
/// are the levels used throughout the player, but any `i32` is accepted.
pub struct Priority;

impl Priority {
    pub const LOW: i32 = 0;
    pub const NORMAL: i32 = 50;
    pub const HIGH: i32 = 100;
    pub const CRITICAL: i32 = 1000;
}

/// A unit of work destined for the consumer thread
pub struct DeferredTask {
    action: Action,
    label: String,
    priority: i32,
    created_at: DateTime<Utc>,
    /// Monotonic creation instant (deadline math must not follow wall-clock jumps)
    created_instant: Instant,
    delay: Option<Duration>,
}

impl DeferredTask {
    /// Create a task from an infallible closure
    pub fn new<F>(label: impl Into<String>, priority: i32, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::fallible(label, priority, move || {
            action();
            Ok(())
        })
    }

    /// Create a task from a closure that reports failure through its result
    pub fn fallible<F>(label: impl Into<String>, priority: i32, action: F) -> Self
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        Self {
            action: Box::new(action),
            label: label.into(),
            priority,
            created_at: Utc::now(),
            created_instant: Instant::now(),
            delay: None,
        }
    }

    /// Return the same task marked to fire no earlier than `delay` after creation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_delayed(&self) -> bool {
        self.delay.is_some()
    }

    /// Requested delay in milliseconds (0 for non-delayed tasks)
    pub fn delay_ms(&self) -> u64 {
        self.delay.map(|d| d.as_millis() as u64).unwrap_or(0)
    }

    /// Earliest instant at which the task may run
    pub fn deadline(&self) -> Instant {
        self.created_instant + self.delay.unwrap_or(Duration::ZERO)
    }

    /// Consume the task and invoke its closure
    ///
    /// Panics are NOT caught here; the executor wraps this call.
    pub fn run(self) -> TaskResult {
        (self.action)()
    }
}

impl fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTask")
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("created_at", &self.created_at)
            .field("delay_ms", &self.delay_ms())
            .finish_non_exhaustive()
    }
}
