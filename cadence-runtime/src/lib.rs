//! # Cadence Runtime (cadence-runtime)
//!
//! Cross-thread coordination core of the player.
//!
//! **Purpose:** Let worker threads (decoders, audio callbacks, I/O) hand work
//! to a single consumer thread, and keep a registry of subsystems with their
//! health plus an asynchronous event bus between them.
//!
//! - [`scheduler`]: deferred execution of closures (immediate, delayed,
//!   batched) on the consumer thread, with priorities and failure isolation
//! - [`registry`]: component directory with typed status and a FIFO event bus
//! - [`consumer`]: the tick driver that runs both on one logical context
//!
//! Nothing here is a singleton: construct a [`Scheduler`] and a
//! [`ComponentRegistry`] and pass `Arc`s to whoever needs them.

pub mod consumer;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod ui_sink;

mod sync;

pub use consumer::{ConsumerHandle, ConsumerLoop};
pub use error::{Error, Result};
pub use registry::{ComponentRegistry, RegistryError};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use ui_sink::UiSink;
