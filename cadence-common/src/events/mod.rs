//! Event types for the cadence event system
//!
//! Two families of events flow through the core:
//! - [`UiEvent`]: handed to the scheduler, which immediately turns it into a
//!   consumer-thread dispatch (it never sits in a queue of its own)
//! - [`IntegrationEvent`]: posted to the registry's event bus and drained in
//!   FIFO order on the bus's tick
//!
//! Both are fire-and-forget: no persistence, no acknowledgment.

mod notifications;
mod payload;

pub use notifications::{RegistryNotification, SchedulerNotification, StatsSnapshot};
pub use payload::Payload;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::component::ComponentType;
use crate::task::Priority;

/// Categories of UI-visible event
///
/// Payload convention per kind:
/// - `Playback`: `Text` (state name) or `Bool` (playing)
/// - `Database`, `File`, `Tag`, `Playlist`: `Text` describing what changed, or `Json`
/// - `Audio`: `Float` (level) or `Text`
/// - `Error`: `Text` (message) or `Status` (forwarded component error)
/// - `Status`: `Text` (status line) or `Status`
/// - `Progress`: `Progress`
/// - `Generic`: any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UiEventKind {
    Playback,
    Database,
    File,
    Audio,
    Tag,
    Playlist,
    Error,
    Status,
    Progress,
    Generic,
}

/// Event destined for UI collaborators on the consumer thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEvent {
    pub kind: UiEventKind,
    pub label: String,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
    pub priority: i32,
}

impl UiEvent {
    /// New event at normal priority, stamped now
    pub fn new(kind: UiEventKind, label: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind,
            label: label.into(),
            payload,
            timestamp: Utc::now(),
            priority: Priority::NORMAL,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Categories of inter-component event on the bus
///
/// Payload convention per kind:
/// - `ComponentInitialized`, `ComponentReady`, `ComponentShutdown`: `None` or `Text`
/// - `ComponentError`: `Text` (error message)
/// - `AudioStateChanged`: `Text` (state) or `Bool` (playing)
/// - `TagChanged`, `PlaylistChanged`, `DatabaseChanged`: `Text` (what changed) or `Json`
/// - `UIUpdateRequired`: any; forwarded verbatim to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntegrationEventKind {
    ComponentInitialized,
    ComponentReady,
    ComponentError,
    ComponentShutdown,
    AudioStateChanged,
    TagChanged,
    PlaylistChanged,
    DatabaseChanged,
    UIUpdateRequired,
}

impl IntegrationEventKind {
    /// UI category this kind surfaces as, if it is forwarded to the UI at all
    pub fn ui_kind(&self) -> Option<UiEventKind> {
        match self {
            IntegrationEventKind::AudioStateChanged => Some(UiEventKind::Playback),
            IntegrationEventKind::TagChanged => Some(UiEventKind::Tag),
            IntegrationEventKind::PlaylistChanged => Some(UiEventKind::Playlist),
            IntegrationEventKind::DatabaseChanged => Some(UiEventKind::Database),
            IntegrationEventKind::ComponentError => Some(UiEventKind::Error),
            IntegrationEventKind::UIUpdateRequired => Some(UiEventKind::Generic),
            IntegrationEventKind::ComponentInitialized
            | IntegrationEventKind::ComponentReady
            | IntegrationEventKind::ComponentShutdown => None,
        }
    }
}

impl fmt::Display for IntegrationEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Event posted by a component to the registry's bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEvent {
    pub kind: IntegrationEventKind,
    pub source: ComponentType,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
    pub priority: i32,
}

impl IntegrationEvent {
    pub fn new(kind: IntegrationEventKind, source: ComponentType, payload: Payload) -> Self {
        Self {
            kind,
            source,
            payload,
            timestamp: Utc::now(),
            priority: Priority::NORMAL,
        }
    }
}
