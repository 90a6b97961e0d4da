//! Component Registry & Event Bus
//!
//! Single source of truth for which subsystems exist and whether they are
//! healthy, plus a FIFO event bus so subsystems react to each other without
//! depending on each other's concrete types.
//!
//! **Locks:** the component table, the event queue, the handler table and the
//! UI sink each have their own lock. Handlers and notifications always run
//! with no registry lock held.
//!
//! **Ordering:** events dispatch strictly in post order within a drain.
//! Status-change notifications are emitted synchronously by the mutating call.

mod error;
mod event_bus;

pub use error::RegistryError;
pub use event_bus::EventHandler;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

use cadence_common::component::instance_ref;
use cadence_common::config::RegistrySettings;
use cadence_common::events::RegistryNotification;
use cadence_common::task::describe_panic;
use cadence_common::{
    ComponentDescriptor, ComponentStatus, ComponentType, InstanceRef, IntegrationEvent,
    IntegrationEventKind, Payload, UiEvent,
};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::sync::{lock, read, write};
use crate::ui_sink::UiSink;
use event_bus::{EventQueue, HandlerTable};

/// Broadcast capacity for registry notifications
const NOTIFICATION_CAPACITY: usize = 1000;

/// Message recorded when the liveness sweep finds a dropped component
const DEAD_INSTANCE_MESSAGE: &str = "component instance is no longer alive";

/// Process-wide component directory and event bus
pub struct ComponentRegistry {
    settings: RegistrySettings,
    components: Mutex<BTreeMap<ComponentType, ComponentDescriptor>>,
    events: Mutex<EventQueue>,
    handlers: RwLock<HandlerTable>,
    ui_sink: RwLock<Option<Arc<dyn UiSink>>>,
    notify_tx: broadcast::Sender<RegistryNotification>,
}

impl ComponentRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        info!(
            "ComponentRegistry initialized: events={}ms, liveness={}ms, max_events={}",
            settings.event_interval_ms, settings.liveness_interval_ms, settings.max_event_queue_size
        );

        Self {
            events: Mutex::new(EventQueue::new(settings.max_event_queue_size)),
            components: Mutex::new(BTreeMap::new()),
            handlers: RwLock::new(HandlerTable::default()),
            ui_sink: RwLock::new(None),
            notify_tx,
            settings,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RegistrySettings::default())
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Subscribe to registry notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryNotification> {
        self.notify_tx.subscribe()
    }

    /// Attach the receiver for UI-visible events (normally the scheduler)
    pub fn set_ui_sink(&self, sink: Arc<dyn UiSink>) {
        *write(&self.ui_sink) = Some(sink);
    }

    pub fn clear_ui_sink(&self) {
        *write(&self.ui_sink) = None;
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a component; fails on a duplicate type or a dead instance
    pub fn try_register_component(
        &self,
        component_type: ComponentType,
        instance: InstanceRef,
        name: impl Into<String>,
    ) -> Result<(), RegistryError> {
        if instance.strong_count() == 0 {
            return Err(RegistryError::NullInstance(component_type));
        }

        let name = name.into();
        {
            let mut components = lock(&self.components);
            if components.contains_key(&component_type) {
                return Err(RegistryError::AlreadyRegistered(component_type));
            }
            components.insert(
                component_type,
                ComponentDescriptor::new(component_type, name.clone(), instance),
            );
        }

        info!("Component registered: {} ({})", name, component_type);
        self.notify(RegistryNotification::ComponentRegistered {
            component: component_type,
            name,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Register a component, returning whether it was accepted
    pub fn register_component(
        &self,
        component_type: ComponentType,
        instance: InstanceRef,
        name: impl Into<String>,
    ) -> bool {
        match self.try_register_component(component_type, instance, name) {
            Ok(()) => true,
            Err(e) => {
                warn!("Registration refused: {}", e);
                false
            }
        }
    }

    /// Register from a strong handle; only a weak reference is kept
    pub fn register<T>(
        &self,
        component_type: ComponentType,
        instance: &Arc<T>,
        name: impl Into<String>,
    ) -> bool
    where
        T: Any + Send + Sync,
    {
        self.register_component(component_type, instance_ref(instance), name)
    }

    /// Move a component to `Shutdown` and remove it
    pub fn try_unregister_component(
        &self,
        component_type: ComponentType,
    ) -> Result<(), RegistryError> {
        let (name, old_status) = {
            let mut components = lock(&self.components);
            let descriptor = components
                .remove(&component_type)
                .ok_or(RegistryError::NotRegistered(component_type))?;
            (descriptor.name, descriptor.status)
        };

        if old_status != ComponentStatus::Shutdown {
            self.log_status_change(component_type, old_status, ComponentStatus::Shutdown);
            self.notify(RegistryNotification::ComponentStatusChanged {
                component: component_type,
                old_status,
                new_status: ComponentStatus::Shutdown,
                timestamp: Utc::now(),
            });
        }

        info!("Component unregistered: {} ({})", name, component_type);
        self.notify(RegistryNotification::ComponentUnregistered {
            component: component_type,
            name,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub fn unregister_component(&self, component_type: ComponentType) -> bool {
        match self.try_unregister_component(component_type) {
            Ok(()) => true,
            Err(e) => {
                warn!("Unregistration refused: {}", e);
                false
            }
        }
    }

    /// Unregister every component
    ///
    /// Returns how many were removed.
    pub fn shutdown_all(&self) -> usize {
        let types: Vec<ComponentType> = lock(&self.components).keys().copied().collect();
        let count = types
            .into_iter()
            .filter(|t| self.try_unregister_component(*t).is_ok())
            .count();
        info!("Registry shutdown: {} component(s) removed", count);
        count
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Update a component's status and error message
    ///
    /// Emits `ComponentStatusChanged`, plus `ComponentError` when the new
    /// status is `Error`.
    pub fn try_set_component_status(
        &self,
        component_type: ComponentType,
        status: ComponentStatus,
        error: &str,
    ) -> Result<(), RegistryError> {
        let old_status = {
            let mut components = lock(&self.components);
            let descriptor = components
                .get_mut(&component_type)
                .ok_or(RegistryError::NotRegistered(component_type))?;

            let old_status = descriptor.status;
            if !old_status.can_transition_to(status) {
                return Err(RegistryError::InvalidTransition {
                    component: component_type,
                    from: old_status,
                    to: status,
                });
            }

            descriptor.status = status;
            descriptor.error_message = error.to_string();
            descriptor.last_updated = Utc::now();
            old_status
        };

        self.log_status_change(component_type, old_status, status);
        self.notify(RegistryNotification::ComponentStatusChanged {
            component: component_type,
            old_status,
            new_status: status,
            timestamp: Utc::now(),
        });

        if status == ComponentStatus::Error {
            warn!("Component {} error: {}", component_type, error);
            self.notify(RegistryNotification::ComponentError {
                component: component_type,
                message: error.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    pub fn set_component_status(
        &self,
        component_type: ComponentType,
        status: ComponentStatus,
        error: &str,
    ) -> bool {
        match self.try_set_component_status(component_type, status, error) {
            Ok(()) => true,
            Err(e) => {
                warn!("Status change refused: {}", e);
                false
            }
        }
    }

    pub fn get_component_status(&self, component_type: ComponentType) -> Option<ComponentStatus> {
        lock(&self.components)
            .get(&component_type)
            .map(|d| d.status)
    }

    /// Snapshot of a component's descriptor
    pub fn get_component(&self, component_type: ComponentType) -> Option<ComponentDescriptor> {
        lock(&self.components).get(&component_type).cloned()
    }

    /// Strong handle to a registered component, if it is alive and a `T`
    pub fn get_instance<T>(&self, component_type: ComponentType) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let weak = lock(&self.components).get(&component_type)?.instance.clone();
        weak.upgrade()?.downcast::<T>().ok()
    }

    pub fn is_registered(&self, component_type: ComponentType) -> bool {
        lock(&self.components).contains_key(&component_type)
    }

    pub fn registered_components(&self) -> Vec<ComponentType> {
        lock(&self.components).keys().copied().collect()
    }

    pub fn component_count(&self) -> usize {
        lock(&self.components).len()
    }

    /// True iff at least one component is registered and all are `Ready`
    pub fn are_all_components_ready(&self) -> bool {
        let components = lock(&self.components);
        !components.is_empty()
            && components
                .values()
                .all(|d| d.status == ComponentStatus::Ready)
    }

    // ========================================================================
    // Event bus
    // ========================================================================

    /// Queue an integration event for the next drain
    ///
    /// A full queue drops the event and emits `EventDropped`.
    pub fn post_event(&self, kind: IntegrationEventKind, source: ComponentType, payload: Payload) {
        self.post(IntegrationEvent::new(kind, source, payload));
    }

    /// Queue a prepared event
    pub fn post(&self, event: IntegrationEvent) {
        let (kind, source) = (event.kind, event.source);
        let result = lock(&self.events).push(event);

        match result {
            Ok(()) => {
                trace!("Event posted: {} from {}", kind, source);
                self.notify(RegistryNotification::EventPosted {
                    kind,
                    source,
                    timestamp: Utc::now(),
                });
            }
            Err(_) => {
                warn!(
                    "Event queue full ({} max), dropping {} from {}",
                    self.settings.max_event_queue_size, kind, source
                );
                self.notify(RegistryNotification::EventDropped {
                    kind,
                    source,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// Register a handler for one event kind
    pub fn add_event_handler(&self, kind: IntegrationEventKind, handler: EventHandler) {
        write(&self.handlers).add(kind, handler);
    }

    pub fn clear_event_handlers(&self) {
        write(&self.handlers).clear();
    }

    pub fn event_queue_depth(&self) -> usize {
        lock(&self.events).len()
    }

    /// Discard queued events; returns how many
    pub fn clear_events(&self) -> usize {
        lock(&self.events).clear()
    }

    /// Drain tick: dispatch every queued event in FIFO order
    ///
    /// Returns how many events were dispatched.
    pub fn process_events(&self) -> usize {
        let batch = lock(&self.events).drain();
        let count = batch.len();
        for event in batch {
            self.dispatch(event);
        }
        if count > 0 {
            trace!("Event drain: {} event(s) dispatched", count);
        }
        count
    }

    fn dispatch(&self, event: IntegrationEvent) {
        let mut failures = Vec::new();

        if let Err(message) = self.apply_builtin(&event) {
            failures.push(message);
        }

        let handlers = read(&self.handlers).for_kind(event.kind);
        for handler in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(&event)))
                .unwrap_or_else(|payload| {
                    Err(format!("handler panicked: {}", describe_panic(payload.as_ref())))
                });
            if let Err(message) = result {
                failures.push(message);
            }
        }

        self.forward_to_ui(&event);

        if failures.is_empty() {
            self.notify(RegistryNotification::EventProcessed {
                kind: event.kind,
                source: event.source,
                timestamp: Utc::now(),
            });
        } else {
            for message in failures {
                warn!("Event {} from {} failed: {}", event.kind, event.source, message);
                self.notify(RegistryNotification::EventError {
                    kind: event.kind,
                    source: event.source,
                    message,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// Lifecycle events update the source component's status
    fn apply_builtin(&self, event: &IntegrationEvent) -> Result<(), String> {
        let (status, message) = match event.kind {
            IntegrationEventKind::ComponentInitialized => (ComponentStatus::Initializing, ""),
            IntegrationEventKind::ComponentReady => (ComponentStatus::Ready, ""),
            IntegrationEventKind::ComponentError => (
                ComponentStatus::Error,
                event.payload.as_text().unwrap_or("unspecified error"),
            ),
            IntegrationEventKind::ComponentShutdown => (ComponentStatus::Shutdown, ""),
            _ => return Ok(()),
        };

        match self.try_set_component_status(event.source, status, message) {
            Ok(()) => Ok(()),
            Err(RegistryError::NotRegistered(component)) => {
                debug!("{} from unregistered component {}", event.kind, component);
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn forward_to_ui(&self, event: &IntegrationEvent) {
        let Some(ui_kind) = event.kind.ui_kind() else {
            return;
        };
        let Some(sink) = read(&self.ui_sink).clone() else {
            return;
        };

        let payload = match event.kind {
            IntegrationEventKind::ComponentError => Payload::Status {
                component: event.source,
                status: ComponentStatus::Error,
                message: event.payload.as_text().unwrap_or_default().to_string(),
            },
            _ => event.payload.clone(),
        };

        let ui_event = UiEvent {
            kind: ui_kind,
            label: format!("{}:{}", event.source, event.kind),
            payload,
            timestamp: event.timestamp,
            priority: event.priority,
        };
        sink.post_ui_event(ui_event);
    }

    // ========================================================================
    // Periodic checks
    // ========================================================================

    /// Liveness sweep: components whose instance was dropped go to `Error`
    ///
    /// Returns how many components changed status.
    pub fn check_liveness(&self) -> usize {
        let dead: Vec<ComponentType> = lock(&self.components)
            .values()
            .filter(|d| {
                !d.is_alive()
                    && !matches!(d.status, ComponentStatus::Error | ComponentStatus::Shutdown)
            })
            .map(|d| d.component_type)
            .collect();

        dead.into_iter()
            .filter(|t| {
                warn!("Liveness check: {} instance is gone", t);
                self.try_set_component_status(*t, ComponentStatus::Error, DEAD_INSTANCE_MESSAGE)
                    .is_ok()
            })
            .count()
    }

    /// Emit a performance sample; returns (component count, queue depth)
    pub fn sample_performance(&self) -> (usize, usize) {
        let component_count = self.component_count();
        let event_queue_depth = self.event_queue_depth();
        debug!(
            "Registry performance: {} component(s), {} queued event(s)",
            component_count, event_queue_depth
        );
        self.notify(RegistryNotification::PerformanceSample {
            component_count,
            event_queue_depth,
            timestamp: Utc::now(),
        });
        (component_count, event_queue_depth)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn log_status_change(&self, component: ComponentType, from: ComponentStatus, to: ComponentStatus) {
        info!(
            "Component {} status: {} -> {} at {}",
            component,
            from,
            to,
            Utc::now().to_rfc3339()
        );
    }

    fn notify(&self, notification: RegistryNotification) {
        // No subscribers is fine
        let _ = self.notify_tx.send(notification);
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("settings", &self.settings)
            .field("components", &self.registered_components())
            .field("event_queue_depth", &self.event_queue_depth())
            .finish_non_exhaustive()
    }
}
