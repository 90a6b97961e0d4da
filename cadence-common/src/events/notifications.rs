//! Notifications emitted by the scheduler and the registry
//!
//! One enum per category, each broadcast on its own channel so UI and
//! logging collaborators subscribe only to what they render.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{IntegrationEventKind, UiEvent};
use crate::component::{ComponentStatus, ComponentType};

/// Scheduler statistics at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Tasks that ran to completion
    pub processed: u64,
    /// Tasks that returned a failure or panicked
    pub failed: u64,
    /// Tasks rejected because their queue was full
    pub dropped: u64,
    pub pending_immediate: usize,
    pub pending_delayed: usize,
    pub pending_batch: usize,
    /// Execution latency over all executed tasks (0.0 until something ran)
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub avg_latency_ms: f64,
    /// When counters were last reset
    pub since: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    pub fn total_pending(&self) -> usize {
        self.pending_immediate + self.pending_delayed + self.pending_batch
    }
}

/// Scheduler notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SchedulerNotification {
    /// A task entered one of the queues
    TaskScheduled {
        label: String,
        priority: i32,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A task ran to completion
    TaskProcessed {
        label: String,
        elapsed_ms: f64,
        timestamp: DateTime<Utc>,
    },

    /// A task failed; `message` is the formatted error-handler text
    TaskFailed {
        label: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A task (or a whole batch) was rejected at capacity
    TaskDropped {
        label: String,
        queue: String,
        timestamp: DateTime<Utc>,
    },

    /// First task of a batch is about to run
    BatchStarted {
        batch_id: Uuid,
        label: String,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tick finished part of a batch
    BatchProgress {
        batch_id: Uuid,
        label: String,
        completed: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// Every task of the batch has been executed
    BatchFinished {
        batch_id: Uuid,
        label: String,
        total: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A UI event was dispatched on the consumer thread
    UiEvent { event: UiEvent },

    /// Periodic statistics snapshot
    Statistics {
        stats: StatsSnapshot,
        timestamp: DateTime<Utc>,
    },
}

/// Registry and event bus notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegistryNotification {
    ComponentRegistered {
        component: ComponentType,
        name: String,
        timestamp: DateTime<Utc>,
    },

    ComponentUnregistered {
        component: ComponentType,
        name: String,
        timestamp: DateTime<Utc>,
    },

    ComponentStatusChanged {
        component: ComponentType,
        old_status: ComponentStatus,
        new_status: ComponentStatus,
        timestamp: DateTime<Utc>,
    },

    /// Emitted alongside `ComponentStatusChanged` when the new status is `Error`
    ComponentError {
        component: ComponentType,
        message: String,
        timestamp: DateTime<Utc>,
    },

    EventPosted {
        kind: IntegrationEventKind,
        source: ComponentType,
        timestamp: DateTime<Utc>,
    },

    EventProcessed {
        kind: IntegrationEventKind,
        source: ComponentType,
        timestamp: DateTime<Utc>,
    },

    /// A handler failed while dispatching an event
    EventError {
        kind: IntegrationEventKind,
        source: ComponentType,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The event queue was full; the event was discarded
    EventDropped {
        kind: IntegrationEventKind,
        source: ComponentType,
        timestamp: DateTime<Utc>,
    },

    PerformanceSample {
        component_count: usize,
        event_queue_depth: usize,
        timestamp: DateTime<Utc>,
    },
}

impl RegistryNotification {
    /// Event type name (for logging)
    pub fn event_type(&self) -> &'static str {
        match self {
            RegistryNotification::ComponentRegistered { .. } => "ComponentRegistered",
            RegistryNotification::ComponentUnregistered { .. } => "ComponentUnregistered",
            RegistryNotification::ComponentStatusChanged { .. } => "ComponentStatusChanged",
            RegistryNotification::ComponentError { .. } => "ComponentError",
            RegistryNotification::EventPosted { .. } => "EventPosted",
            RegistryNotification::EventProcessed { .. } => "EventProcessed",
            RegistryNotification::EventError { .. } => "EventError",
            RegistryNotification::EventDropped { .. } => "EventDropped",
            RegistryNotification::PerformanceSample { .. } => "PerformanceSample",
        }
    }
}

impl SchedulerNotification {
    /// Event type name (for logging)
    pub fn event_type(&self) -> &'static str {
        match self {
            SchedulerNotification::TaskScheduled { .. } => "TaskScheduled",
            SchedulerNotification::TaskProcessed { .. } => "TaskProcessed",
            SchedulerNotification::TaskFailed { .. } => "TaskFailed",
            SchedulerNotification::TaskDropped { .. } => "TaskDropped",
            SchedulerNotification::BatchStarted { .. } => "BatchStarted",
            SchedulerNotification::BatchProgress { .. } => "BatchProgress",
            SchedulerNotification::BatchFinished { .. } => "BatchFinished",
            SchedulerNotification::UiEvent { .. } => "UiEvent",
            SchedulerNotification::Statistics { .. } => "Statistics",
        }
    }
}
