//! Component identity and health types
//!
//! Every long-lived subsystem of the player (audio engine, tag manager,
//! playlist manager, ...) is known to the registry by its [`ComponentType`].
//! The registry keeps one [`ComponentDescriptor`] per type and only ever holds
//! a weak back-reference to the component itself; the creator owns it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// Weak, type-erased reference to a registered component instance
pub type InstanceRef = Weak<dyn Any + Send + Sync>;

/// Downgrade a strong component handle into an [`InstanceRef`]
pub fn instance_ref<T>(instance: &Arc<T>) -> InstanceRef
where
    T: Any + Send + Sync,
{
    let erased: Arc<dyn Any + Send + Sync> = instance.clone();
    Arc::downgrade(&erased)
}

/// A reference that points at nothing; registering it is rejected
pub fn null_instance() -> InstanceRef {
    Weak::<()>::new()
}

/// Kinds of subsystem the registry knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentType {
    AudioEngine,
    TagManager,
    PlaylistManager,
    MainThreadManager,
    AudioWorkerThread,
    DatabaseManager,
    Logger,
    Unknown,
}

impl ComponentType {
    /// Human-readable default name
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::AudioEngine => "AudioEngine",
            ComponentType::TagManager => "TagManager",
            ComponentType::PlaylistManager => "PlaylistManager",
            ComponentType::MainThreadManager => "MainThreadManager",
            ComponentType::AudioWorkerThread => "AudioWorkerThread",
            ComponentType::DatabaseManager => "DatabaseManager",
            ComponentType::Logger => "Logger",
            ComponentType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component lifecycle
///
/// `NotInitialized → Initializing → Ready ⇄ Error → Shutdown`
///
/// `Shutdown` is terminal: nothing may leave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentStatus {
    NotInitialized,
    Initializing,
    Ready,
    Error,
    Shutdown,
}

impl ComponentStatus {
    /// Whether a status change from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: ComponentStatus) -> bool {
        !matches!(self, ComponentStatus::Shutdown) || next == ComponentStatus::Shutdown
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ComponentStatus::Shutdown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::NotInitialized => "NotInitialized",
            ComponentStatus::Initializing => "Initializing",
            ComponentStatus::Ready => "Ready",
            ComponentStatus::Error => "Error",
            ComponentStatus::Shutdown => "Shutdown",
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The registry's record of one component
///
/// `status`, `last_updated` and `error_message` are only mutated by the
/// registry itself.
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    pub component_type: ComponentType,
    pub name: String,
    pub status: ComponentStatus,
    /// Back-reference only; the registry never keeps a component alive
    pub instance: InstanceRef,
    pub last_updated: DateTime<Utc>,
    /// Empty unless the component is (or was last) in `Error`
    pub error_message: String,
}

impl ComponentDescriptor {
    /// Fresh descriptor in `NotInitialized`
    pub fn new(component_type: ComponentType, name: impl Into<String>, instance: InstanceRef) -> Self {
        Self {
            component_type,
            name: name.into(),
            status: ComponentStatus::NotInitialized,
            instance,
            last_updated: Utc::now(),
            error_message: String::new(),
        }
    }

    /// True while the creator still holds the component
    pub fn is_alive(&self) -> bool {
        self.instance.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEngine;

    #[test]
    fn test_shutdown_is_terminal() {
        assert!(ComponentStatus::Shutdown.is_terminal());
        assert!(!ComponentStatus::Shutdown.can_transition_to(ComponentStatus::Ready));
        assert!(!ComponentStatus::Shutdown.can_transition_to(ComponentStatus::Error));
        assert!(ComponentStatus::Shutdown.can_transition_to(ComponentStatus::Shutdown));
    }

    #[test]
    fn test_error_can_recover_to_ready() {
        assert!(ComponentStatus::Error.can_transition_to(ComponentStatus::Ready));
        assert!(ComponentStatus::Ready.can_transition_to(ComponentStatus::Error));
        assert!(ComponentStatus::NotInitialized.can_transition_to(ComponentStatus::Initializing));
    }

    #[test]
    fn test_descriptor_tracks_liveness() {
        let engine = Arc::new(FakeEngine);
        let descriptor = ComponentDescriptor::new(
            ComponentType::AudioEngine,
            "engine",
            instance_ref(&engine),
        );

        assert_eq!(descriptor.status, ComponentStatus::NotInitialized);
        assert!(descriptor.error_message.is_empty());
        assert!(descriptor.is_alive());

        drop(engine);
        assert!(!descriptor.is_alive());
    }

    #[test]
    fn test_null_instance_is_dead() {
        assert_eq!(null_instance().strong_count(), 0);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ComponentType::PlaylistManager.to_string(), "PlaylistManager");
        assert_eq!(ComponentStatus::Ready.to_string(), "Ready");
    }
}
