//! Registration errors

use cadence_common::{ComponentStatus, ComponentType};
use thiserror::Error;

/// Why a registry mutation was refused
///
/// A refused call never leaves partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("component {0} is already registered")]
    AlreadyRegistered(ComponentType),

    #[error("component {0} was registered with a dead or null instance")]
    NullInstance(ComponentType),

    #[error("component {0} is not registered")]
    NotRegistered(ComponentType),

    #[error("component {component} cannot move from {from} to {to}")]
    InvalidTransition {
        component: ComponentType,
        from: ComponentStatus,
        to: ComponentStatus,
    },
}
