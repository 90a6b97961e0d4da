//! End-to-end tests: scheduler and registry driven by a real consumer thread
//!
//! These rely on wall-clock ticks, so they run serially.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_common::config::{RegistrySettings, SchedulerSettings};
use cadence_common::events::{RegistryNotification, SchedulerNotification};
use cadence_common::{
    ComponentStatus, ComponentType, IntegrationEventKind, Payload, Priority, UiEvent, UiEventKind,
};
use cadence_runtime::consumer::CONSUMER_THREAD_NAME;
use cadence_runtime::{ComponentRegistry, ConsumerLoop, Scheduler, SchedulerConfig};
use serial_test::serial;
use tokio::sync::{oneshot, watch};

const TIMEOUT: Duration = Duration::from_secs(5);

struct AudioEngine;
struct TagManager;

fn fast_scheduler() -> Arc<Scheduler> {
    Arc::new(Scheduler::new(SchedulerConfig::from_settings(SchedulerSettings {
        update_interval_ms: 2,
        delayed_interval_ms: 5,
        batch_interval_ms: 5,
        ..SchedulerSettings::default()
    })))
}

fn fast_registry() -> Arc<ComponentRegistry> {
    Arc::new(ComponentRegistry::new(RegistrySettings {
        event_interval_ms: 2,
        liveness_interval_ms: 10,
        ..RegistrySettings::default()
    }))
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
#[serial]
fn test_delayed_task_respects_delay() {
    let scheduler = fast_scheduler();
    let consumer = ConsumerLoop::new(Arc::clone(&scheduler)).spawn_thread().unwrap();

    let (tx, rx) = mpsc::channel();
    let scheduled_at = Instant::now();
    scheduler.schedule_delayed("crossfade", 100, Priority::NORMAL, move || {
        let _ = tx.send(Instant::now());
    });

    let ran_at = rx.recv_timeout(TIMEOUT).unwrap();
    assert!(ran_at.duration_since(scheduled_at) >= Duration::from_millis(100));

    consumer.join().unwrap();
}

#[test]
#[serial]
fn test_ui_events_from_bus_reach_consumer_thread() {
    let scheduler = fast_scheduler();
    let registry = fast_registry();
    registry.set_ui_sink(scheduler.clone());

    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    scheduler.add_ui_handler(
        UiEventKind::Playback,
        Arc::new(move |event: &UiEvent| {
            let thread = std::thread::current().name().map(str::to_string);
            let state = event.payload.as_text().unwrap_or("").to_string();
            let _ = tx.lock().unwrap().send((thread, state));
        }),
    );

    let consumer = ConsumerLoop::new(Arc::clone(&scheduler))
        .with_registry(Arc::clone(&registry))
        .spawn_thread()
        .unwrap();

    let producer_registry = Arc::clone(&registry);
    std::thread::spawn(move || {
        producer_registry.post_event(
            IntegrationEventKind::AudioStateChanged,
            ComponentType::AudioEngine,
            Payload::text("Playing"),
        );
    })
    .join()
    .unwrap();

    let (thread, state) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(thread.as_deref(), Some(CONSUMER_THREAD_NAME));
    assert_eq!(state, "Playing");

    consumer.join().unwrap();
}

#[test]
#[serial]
fn test_lifecycle_and_liveness_through_consumer() {
    let scheduler = fast_scheduler();
    let registry = fast_registry();
    let engine = Arc::new(AudioEngine);
    let tags = Arc::new(TagManager);
    registry.register(ComponentType::AudioEngine, &engine, "engine");
    registry.register(ComponentType::TagManager, &tags, "tags");

    let consumer = ConsumerLoop::new(Arc::clone(&scheduler))
        .with_registry(Arc::clone(&registry))
        .spawn_thread()
        .unwrap();

    for component in [ComponentType::AudioEngine, ComponentType::TagManager] {
        registry.post_event(IntegrationEventKind::ComponentReady, component, Payload::None);
    }
    assert!(wait_until(|| registry.are_all_components_ready()));

    drop(tags);
    assert!(wait_until(|| {
        registry.get_component_status(ComponentType::TagManager) == Some(ComponentStatus::Error)
    }));
    assert!(!registry.are_all_components_ready());
    assert_eq!(
        registry.get_component_status(ComponentType::AudioEngine),
        Some(ComponentStatus::Ready)
    );

    consumer.join().unwrap();
}

#[test]
#[serial]
fn test_invoke_runs_inline_on_consumer_thread() {
    let scheduler = fast_scheduler();
    let consumer = ConsumerLoop::new(Arc::clone(&scheduler)).spawn_thread().unwrap();

    let (tx, rx) = mpsc::channel();
    let inner = Arc::clone(&scheduler);
    scheduler.schedule_immediate("outer", Priority::NORMAL, move || {
        let (inner_tx, inner_rx) = mpsc::channel();
        inner.invoke("inner", move || {
            let _ = inner_tx.send(());
        });
        // Ran synchronously: the result is already there
        let _ = tx.send(inner_rx.try_recv().is_ok());
    });

    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    consumer.join().unwrap();
}

#[test]
#[serial]
fn test_shutdown_leaves_pending_work() {
    let scheduler = fast_scheduler();
    let consumer = ConsumerLoop::new(Arc::clone(&scheduler)).spawn_thread().unwrap();
    consumer.join().unwrap();

    scheduler.schedule_immediate("orphan", Priority::NORMAL, || {});
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(scheduler.pending_immediate(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_consumer_identity_stays_with_loop_on_shared_workers() {
    let scheduler = fast_scheduler();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = tokio::spawn(ConsumerLoop::new(Arc::clone(&scheduler)).run_until(shutdown_rx));

    let (tx, rx) = oneshot::channel();
    let inner = Arc::clone(&scheduler);
    scheduler.schedule_immediate("identity", Priority::NORMAL, move || {
        let _ = tx.send(inner.is_consumer_thread());
    });
    assert!(tokio::time::timeout(TIMEOUT, rx).await.unwrap().unwrap());

    // Unrelated tasks share worker threads with the loop
    let bystanders: Vec<_> = (0..200)
        .map(|i| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                if i % 2 == 0 {
                    tokio::task::yield_now().await;
                }
                scheduler.is_consumer_thread()
            })
        })
        .collect();
    let mut claimed = 0;
    for bystander in bystanders {
        if bystander.await.unwrap() {
            claimed += 1;
        }
    }
    assert_eq!(claimed, 0);

    // invoke from a bystander queues instead of running inline
    scheduler.pause();
    let outsider = Arc::clone(&scheduler);
    let ran_inline = tokio::spawn(async move {
        let (inline_tx, inline_rx) = std::sync::mpsc::channel();
        outsider.invoke("outsider", move || {
            let _ = inline_tx.send(());
        });
        inline_rx.try_recv().is_ok()
    })
    .await
    .unwrap();
    assert!(!ran_inline);
    assert_eq!(scheduler.pending_immediate(), 1);
    scheduler.resume();

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(TIMEOUT, consumer).await.unwrap().unwrap();
}

#[test]
#[serial]
fn test_performance_samples_while_monitoring() {
    let scheduler = fast_scheduler();
    let registry = Arc::new(ComponentRegistry::new(RegistrySettings {
        event_interval_ms: 2,
        liveness_interval_ms: 10,
        performance_monitoring: true,
        performance_interval_ms: 10,
        ..RegistrySettings::default()
    }));
    let engine = Arc::new(AudioEngine);
    registry.register(ComponentType::AudioEngine, &engine, "engine");
    let mut rx = registry.subscribe();

    let consumer = ConsumerLoop::new(Arc::clone(&scheduler))
        .with_registry(Arc::clone(&registry))
        .spawn_thread()
        .unwrap();

    let mut samples = Vec::new();
    assert!(wait_until(|| {
        while let Ok(n) = rx.try_recv() {
            if let RegistryNotification::PerformanceSample { component_count, .. } = n {
                samples.push(component_count);
            }
        }
        samples.len() >= 2
    }));
    assert!(samples.iter().all(|&count| count == 1));

    consumer.join().unwrap();
}

#[test]
#[serial]
fn test_no_performance_samples_when_monitoring_off() {
    let scheduler = fast_scheduler();
    let registry = fast_registry();
    let mut rx = registry.subscribe();

    let consumer = ConsumerLoop::new(Arc::clone(&scheduler))
        .with_registry(Arc::clone(&registry))
        .spawn_thread()
        .unwrap();
    std::thread::sleep(Duration::from_millis(50));
    consumer.join().unwrap();

    while let Ok(n) = rx.try_recv() {
        assert!(!matches!(n, RegistryNotification::PerformanceSample { .. }));
    }
}

#[test]
#[serial]
fn test_periodic_statistics_from_consumer() {
    let scheduler = Arc::new(Scheduler::new(SchedulerConfig::from_settings(SchedulerSettings {
        update_interval_ms: 2,
        stats_interval_ms: 10,
        ..SchedulerSettings::default()
    })));
    let mut rx = scheduler.subscribe();
    scheduler.schedule_immediate("counted", Priority::NORMAL, || {});

    let consumer = ConsumerLoop::new(Arc::clone(&scheduler)).spawn_thread().unwrap();

    let mut last_processed = None;
    assert!(wait_until(|| {
        while let Ok(n) = rx.try_recv() {
            if let SchedulerNotification::Statistics { stats, .. } = n {
                last_processed = Some(stats.processed);
            }
        }
        last_processed == Some(1)
    }));

    consumer.join().unwrap();
}
