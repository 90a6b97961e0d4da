//! Error types for cadence-runtime
//!
//! Only setup paths return errors. Scheduling, posting and dispatch never
//! fail towards the caller; see the scheduler and registry modules.

use thiserror::Error;

/// Main error type for cadence-runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the common crate (configuration loading, I/O)
    #[error(transparent)]
    Common(#[from] cadence_common::Error),

    /// Consumer thread or runtime could not be started or joined
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using cadence-runtime Error
pub type Result<T> = std::result::Result<T, Error>;
