//! Cadence host (cadence-host) - Main entry point
//!
//! Runs the coordination core against simulated player components: several
//! producer threads hammer the scheduler and the event bus while a dedicated
//! consumer thread drains them. Prints the final scheduler statistics as JSON.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use cadence_common::config::CadenceConfig;
use cadence_common::{
    ComponentType, IntegrationEvent, IntegrationEventKind, Payload, Priority, TaskFailure,
    UiEvent, UiEventKind,
};
use cadence_runtime::{ComponentRegistry, ConsumerLoop, Scheduler, SchedulerConfig};
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for cadence-host
#[derive(Parser, Debug)]
#[command(name = "cadence-host")]
#[command(about = "Demo host for the cadence scheduler and component registry")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// How long to run before shutting down (ms)
    #[arg(short, long, default_value = "2000")]
    duration_ms: u64,

    /// Number of producer threads
    #[arg(short, long, default_value = "4")]
    producers: usize,
}

/// Simulated subsystems; the registry only sees them through weak refs
struct AudioEngine {
    frames: AtomicU64,
}

struct TagManager;

struct PlaylistManager {
    revision: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CadenceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "cadence_host={level},cadence_runtime={level},cadence_common={level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    info!(
        "Starting cadence-host (git {}, built {}, {})",
        env!("CADENCE_GIT_HASH"),
        env!("CADENCE_BUILD_TIMESTAMP"),
        env!("CADENCE_BUILD_PROFILE")
    );
    info!(
        "Running {} producer(s) for {}ms",
        args.producers, args.duration_ms
    );

    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig::from_settings(config.scheduler.clone())
            .with_error_handler(Arc::new(|message: &str| error!("Scheduler: {}", message))),
    ));
    let registry = Arc::new(ComponentRegistry::new(config.registry.clone()));
    registry.set_ui_sink(scheduler.clone());

    install_ui_handlers(&scheduler);
    install_event_handlers(&registry);

    let engine = Arc::new(AudioEngine {
        frames: AtomicU64::new(0),
    });
    let tags = Arc::new(TagManager);
    let playlist = Arc::new(PlaylistManager {
        revision: AtomicU64::new(0),
    });
    registry.register(ComponentType::AudioEngine, &engine, "Audio Engine");
    registry.register(ComponentType::TagManager, &tags, "Tag Manager");
    registry.register(ComponentType::PlaylistManager, &playlist, "Playlist Manager");

    for component in registry.registered_components() {
        registry.post_event(IntegrationEventKind::ComponentInitialized, component, Payload::None);
        registry.post_event(IntegrationEventKind::ComponentReady, component, Payload::None);
    }

    spawn_notification_logger(&scheduler, &registry);

    let consumer = ConsumerLoop::new(Arc::clone(&scheduler))
        .with_registry(Arc::clone(&registry))
        .spawn_thread()
        .context("Failed to start consumer thread")?;

    let running = Arc::new(AtomicBool::new(true));
    let producers: Vec<JoinHandle<()>> = (0..args.producers)
        .map(|id| {
            spawn_producer(
                id,
                Arc::clone(&scheduler),
                Arc::clone(&registry),
                Arc::clone(&running),
            )
        })
        .collect::<std::io::Result<_>>()
        .context("Failed to start producer threads")?;

    // Halfway through, the tag manager goes away without unregistering
    let half = Duration::from_millis(args.duration_ms / 2);
    tokio::spawn(async move {
        tokio::time::sleep(half).await;
        warn!("Dropping tag manager without unregistering it");
        drop(tags);
    });

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(args.duration_ms)) => {
            info!("Run duration elapsed, shutting down");
        }
        _ = shutdown_signal() => {}
    }

    running.store(false, Ordering::Relaxed);
    for producer in producers {
        if producer.join().is_err() {
            warn!("Producer thread panicked");
        }
    }

    consumer.join().context("Consumer thread failed")?;

    info!(
        "All components ready at shutdown: {}",
        registry.are_all_components_ready()
    );
    for component in registry.registered_components() {
        if let Some(descriptor) = registry.get_component(component) {
            info!(
                "  {} ({}): {} {}",
                descriptor.name, component, descriptor.status, descriptor.error_message
            );
        }
    }
    info!(
        "Engine rendered {} frame(s), playlist at revision {}",
        engine.frames.load(Ordering::Relaxed),
        playlist.revision.load(Ordering::Relaxed)
    );

    let stats = scheduler.statistics();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    registry.shutdown_all();
    info!("cadence-host shutdown complete");
    Ok(())
}

fn install_ui_handlers(scheduler: &Arc<Scheduler>) {
    scheduler.add_ui_handler(
        UiEventKind::Status,
        Arc::new(|event: &UiEvent| info!("[status] {}", event.payload.as_text().unwrap_or(""))),
    );
    scheduler.add_ui_handler(
        UiEventKind::Error,
        Arc::new(|event: &UiEvent| warn!("[error] {}: {:?}", event.label, event.payload)),
    );
    scheduler.add_ui_handler(
        UiEventKind::Playlist,
        Arc::new(|event: &UiEvent| debug!("[playlist] {}", event.payload.as_text().unwrap_or(""))),
    );
    scheduler.add_ui_handler(
        UiEventKind::Progress,
        Arc::new(|event: &UiEvent| {
            if let Some((percent, message)) = event.payload.as_progress() {
                debug!("[progress] {} {}%", message, percent);
            }
        }),
    );
}

fn install_event_handlers(registry: &Arc<ComponentRegistry>) {
    let weak = Arc::downgrade(registry);
    registry.add_event_handler(
        IntegrationEventKind::TagChanged,
        Arc::new(move |event: &IntegrationEvent| -> Result<(), String> {
            let registry = weak.upgrade().ok_or("registry gone")?;
            if registry.get_instance::<TagManager>(ComponentType::TagManager).is_none() {
                return Err(format!(
                    "tag update '{}' arrived after the tag manager went away",
                    event.payload.as_text().unwrap_or("")
                ));
            }
            Ok(())
        }),
    );
    registry.add_event_handler(
        IntegrationEventKind::PlaylistChanged,
        Arc::new(|event: &IntegrationEvent| -> Result<(), String> {
            debug!("Playlist changed: {}", event.payload.as_text().unwrap_or(""));
            Ok(())
        }),
    );
}

fn spawn_notification_logger(scheduler: &Scheduler, registry: &ComponentRegistry) {
    let mut scheduler_rx = scheduler.subscribe();
    let mut registry_rx = registry.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                n = scheduler_rx.recv() => match n {
                    Ok(n) => debug!("scheduler notification: {}", n.event_type()),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("notification logger lagged by {} scheduler event(s)", skipped);
                    }
                    Err(_) => break,
                },
                n = registry_rx.recv() => match n {
                    Ok(n) => debug!("registry notification: {}", n.event_type()),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("notification logger lagged by {} registry event(s)", skipped);
                    }
                    Err(_) => break,
                },
            }
        }
    });
}

/// Worker thread producing a mix of every kind of work
fn spawn_producer(
    id: usize,
    scheduler: Arc<Scheduler>,
    registry: Arc<ComponentRegistry>,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("producer-{}", id))
        .spawn(move || {
            let mut round: u64 = 0;
            while running.load(Ordering::Relaxed) {
                round += 1;

                let engine_registry = Arc::clone(&registry);
                scheduler.schedule_immediate(
                    format!("p{}:render:{}", id, round),
                    Priority::HIGH,
                    move || {
                        if let Some(engine) =
                            engine_registry.get_instance::<AudioEngine>(ComponentType::AudioEngine)
                        {
                            engine.frames.fetch_add(512, Ordering::Relaxed);
                        }
                    },
                );

                if round % 5 == 0 {
                    scheduler.schedule_delayed(
                        format!("p{}:fade:{}", id, round),
                        25,
                        Priority::NORMAL,
                        move || debug!("fade step {} from producer {}", round, id),
                    );
                    registry.post_event(
                        IntegrationEventKind::TagChanged,
                        ComponentType::TagManager,
                        Payload::text(format!("track-{}", round)),
                    );
                }

                if round % 10 == 0 {
                    let playlist_registry = Arc::clone(&registry);
                    scheduler.schedule_batch(
                        format!("p{}:rescan:{}", id, round),
                        (0..4).map(move |_| {
                            let registry = Arc::clone(&playlist_registry);
                            move || {
                                if let Some(playlist) = registry
                                    .get_instance::<PlaylistManager>(ComponentType::PlaylistManager)
                                {
                                    playlist.revision.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }),
                    );
                    registry.post_event(
                        IntegrationEventKind::PlaylistChanged,
                        ComponentType::PlaylistManager,
                        Payload::text(format!("rescan {} from producer {}", round, id)),
                    );
                    scheduler.post_progress(format!("producer {}", id), (round % 100) as u8);
                }

                if round % 25 == 0 {
                    scheduler.schedule_task(cadence_common::DeferredTask::fallible(
                        format!("p{}:decode:{}", id, round),
                        Priority::LOW,
                        move || Err(TaskFailure::failed(format!("corrupt frame in round {}", round))),
                    ));
                    scheduler.post_status(format!("producer {} at round {}", id, round));
                }

                std::thread::sleep(Duration::from_millis(5));
            }
            debug!("Producer {} stopped after {} round(s)", id, round);
        })
}

/// Ctrl+C / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
