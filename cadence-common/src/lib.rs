//! # Cadence Common Library
//!
//! Shared code for the cadence coordination core:
//! - Value types handed between producers and the consumer thread
//!   (deferred tasks, UI events, integration events)
//! - Component identity and health types (ComponentType, ComponentStatus,
//!   ComponentDescriptor)
//! - Notification enums broadcast by the scheduler and the registry
//! - Configuration loading
//! - Utility functions

pub mod component;
pub mod config;
pub mod error;
pub mod events;
pub mod task;
pub mod time;

pub use component::{ComponentDescriptor, ComponentStatus, ComponentType, InstanceRef};
pub use error::{Error, Result};
pub use events::{IntegrationEvent, IntegrationEventKind, Payload, UiEvent, UiEventKind};
pub use task::{DeferredTask, Priority, TaskFailure, TaskResult};
