//! Integration tests for the component registry and event bus

use std::sync::{Arc, Mutex};
use std::thread;

use cadence_common::events::RegistryNotification;
use cadence_common::{
    ComponentStatus, ComponentType, IntegrationEvent, IntegrationEventKind, Payload,
};
use cadence_runtime::ComponentRegistry;

struct AudioEngine;
struct TagManager;
struct PlaylistManager;

#[test]
fn test_readiness_scenario() {
    let registry = ComponentRegistry::with_defaults();
    let engine = Arc::new(AudioEngine);
    let tags = Arc::new(TagManager);

    assert!(!registry.are_all_components_ready());

    assert!(registry.register(ComponentType::AudioEngine, &engine, "engine"));
    assert!(registry.register(ComponentType::TagManager, &tags, "tags"));
    assert!(!registry.are_all_components_ready());

    registry.set_component_status(ComponentType::AudioEngine, ComponentStatus::Ready, "");
    assert!(!registry.are_all_components_ready());

    registry.set_component_status(ComponentType::TagManager, ComponentStatus::Ready, "");
    assert!(registry.are_all_components_ready());

    registry.set_component_status(ComponentType::TagManager, ComponentStatus::Error, "boom");
    assert!(!registry.are_all_components_ready());
    let descriptor = registry.get_component(ComponentType::TagManager).unwrap();
    assert_eq!(descriptor.status, ComponentStatus::Error);
    assert_eq!(descriptor.error_message, "boom");
}

#[test]
fn test_status_notifications_in_call_order() {
    let registry = ComponentRegistry::with_defaults();
    let playlist = Arc::new(PlaylistManager);
    let mut rx = registry.subscribe();

    registry.register(ComponentType::PlaylistManager, &playlist, "playlist");
    registry.set_component_status(ComponentType::PlaylistManager, ComponentStatus::Initializing, "");
    registry.set_component_status(ComponentType::PlaylistManager, ComponentStatus::Ready, "");

    let mut transitions = Vec::new();
    while let Ok(n) = rx.try_recv() {
        if let RegistryNotification::ComponentStatusChanged {
            old_status,
            new_status,
            ..
        } = n
        {
            transitions.push((old_status, new_status));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (ComponentStatus::NotInitialized, ComponentStatus::Initializing),
            (ComponentStatus::Initializing, ComponentStatus::Ready),
        ]
    );
}

#[test]
fn test_events_posted_from_threads_are_all_dispatched() {
    let registry = Arc::new(ComponentRegistry::with_defaults());
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    registry.add_event_handler(
        IntegrationEventKind::DatabaseChanged,
        Arc::new(move |event: &IntegrationEvent| -> Result<(), String> {
            sink.lock().unwrap().push(event.payload.as_int().unwrap_or(-1));
            Ok(())
        }),
    );

    let posters: Vec<_> = (0..4)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..50 {
                    registry.post_event(
                        IntegrationEventKind::DatabaseChanged,
                        ComponentType::DatabaseManager,
                        Payload::Int(t * 1000 + i),
                    );
                }
            })
        })
        .collect();
    for poster in posters {
        poster.join().unwrap();
    }

    // Nothing dispatches until the drain
    assert!(received.lock().unwrap().is_empty());
    assert_eq!(registry.process_events(), 200);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 200);
    // Per-thread post order survives
    for t in 0..4i64 {
        let mine: Vec<i64> = received
            .iter()
            .copied()
            .filter(|v| v / 1000 == t)
            .collect();
        let expected: Vec<i64> = (0..50).map(|i| t * 1000 + i).collect();
        assert_eq!(mine, expected);
    }
}

#[test]
fn test_fifo_across_kinds() {
    let registry = ComponentRegistry::with_defaults();
    let order = Arc::new(Mutex::new(Vec::new()));

    for kind in [
        IntegrationEventKind::TagChanged,
        IntegrationEventKind::PlaylistChanged,
        IntegrationEventKind::AudioStateChanged,
    ] {
        let order = Arc::clone(&order);
        registry.add_event_handler(
            kind,
            Arc::new(move |event: &IntegrationEvent| -> Result<(), String> {
                order.lock().unwrap().push(event.payload.as_text().unwrap_or("").to_string());
                Ok(())
            }),
        );
    }

    registry.post_event(IntegrationEventKind::TagChanged, ComponentType::TagManager, Payload::text("A"));
    registry.post_event(IntegrationEventKind::PlaylistChanged, ComponentType::PlaylistManager, Payload::text("B"));
    registry.post_event(IntegrationEventKind::AudioStateChanged, ComponentType::AudioEngine, Payload::text("C"));
    registry.process_events();

    assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
}

#[test]
fn test_event_posted_during_drain_waits_for_next_cycle() {
    let registry = Arc::new(ComponentRegistry::with_defaults());
    let weak = Arc::downgrade(&registry);
    let hits = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&hits);

    registry.add_event_handler(
        IntegrationEventKind::TagChanged,
        Arc::new(move |event: &IntegrationEvent| -> Result<(), String> {
            *counter.lock().unwrap() += 1;
            if event.payload.as_text() == Some("first") {
                if let Some(registry) = weak.upgrade() {
                    registry.post_event(
                        IntegrationEventKind::TagChanged,
                        ComponentType::TagManager,
                        Payload::text("follow-up"),
                    );
                }
            }
            Ok(())
        }),
    );

    registry.post_event(IntegrationEventKind::TagChanged, ComponentType::TagManager, Payload::text("first"));
    assert_eq!(registry.process_events(), 1);
    assert_eq!(registry.event_queue_depth(), 1);
    assert_eq!(registry.process_events(), 1);
    assert_eq!(*hits.lock().unwrap(), 2);
}

#[test]
fn test_unregister_then_reregister() {
    let registry = ComponentRegistry::with_defaults();
    let engine = Arc::new(AudioEngine);

    assert!(registry.register(ComponentType::AudioEngine, &engine, "engine"));
    assert!(registry.unregister_component(ComponentType::AudioEngine));
    assert_eq!(registry.get_component_status(ComponentType::AudioEngine), None);

    assert!(registry.register(ComponentType::AudioEngine, &engine, "engine again"));
    assert_eq!(
        registry.get_component_status(ComponentType::AudioEngine),
        Some(ComponentStatus::NotInitialized)
    );
}
