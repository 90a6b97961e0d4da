//! Integration event queue and handler table
//!
//! Strict FIFO, bounded. A drain takes everything queued at that moment;
//! events posted while the drain dispatches wait for the next cycle.

use cadence_common::{IntegrationEvent, IntegrationEventKind};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Handler for one kind of integration event
///
/// Returning `Err` (or panicking) produces an `EventError` notification; it
/// never stops the drain.
pub type EventHandler = Arc<dyn Fn(&IntegrationEvent) -> Result<(), String> + Send + Sync>;

pub(crate) struct EventQueue {
    events: VecDeque<IntegrationEvent>,
    capacity: usize,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
        }
    }

    /// Append, or hand the event back when full
    pub(crate) fn push(&mut self, event: IntegrationEvent) -> Result<(), IntegrationEvent> {
        if self.events.len() >= self.capacity {
            return Err(event);
        }
        self.events.push_back(event);
        Ok(())
    }

    /// Take every queued event, oldest first
    pub(crate) fn drain(&mut self) -> VecDeque<IntegrationEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let n = self.events.len();
        self.events.clear();
        n
    }
}

/// Handlers keyed by event kind, in registration order
#[derive(Default)]
pub(crate) struct HandlerTable {
    handlers: HashMap<IntegrationEventKind, Vec<EventHandler>>,
}

impl HandlerTable {
    pub(crate) fn add(&mut self, kind: IntegrationEventKind, handler: EventHandler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Clone out the handlers for `kind` so they can run without the lock
    pub(crate) fn for_kind(&self, kind: IntegrationEventKind) -> Vec<EventHandler> {
        self.handlers.get(&kind).cloned().unwrap_or_default()
    }

    pub(crate) fn clear(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::{ComponentType, Payload};

    fn event(kind: IntegrationEventKind, text: &str) -> IntegrationEvent {
        IntegrationEvent::new(kind, ComponentType::AudioEngine, Payload::text(text))
    }

    #[test]
    fn test_fifo_drain() {
        let mut queue = EventQueue::new(10);
        for name in ["A", "B", "C"] {
            queue.push(event(IntegrationEventKind::AudioStateChanged, name)).ok();
        }

        let drained: Vec<String> = queue
            .drain()
            .into_iter()
            .filter_map(|e| e.payload.as_text().map(str::to_string))
            .collect();
        assert_eq!(drained, vec!["A", "B", "C"]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_bounded() {
        let mut queue = EventQueue::new(1);
        assert!(queue.push(event(IntegrationEventKind::TagChanged, "x")).is_ok());
        let rejected = queue
            .push(event(IntegrationEventKind::TagChanged, "y"))
            .expect_err("full");
        assert_eq!(rejected.payload.as_text(), Some("y"));
        assert_eq!(queue.clear(), 1);
    }

    #[test]
    fn test_handler_table_by_kind() {
        let mut table = HandlerTable::default();
        let ok: EventHandler = Arc::new(|_: &IntegrationEvent| Ok(()));
        let failing: EventHandler = Arc::new(|_: &IntegrationEvent| Err("nope".to_string()));
        table.add(IntegrationEventKind::TagChanged, ok);
        table.add(IntegrationEventKind::TagChanged, failing);

        assert_eq!(table.for_kind(IntegrationEventKind::TagChanged).len(), 2);
        assert!(table.for_kind(IntegrationEventKind::PlaylistChanged).is_empty());

        table.clear();
        assert!(table.for_kind(IntegrationEventKind::TagChanged).is_empty());
    }
}
