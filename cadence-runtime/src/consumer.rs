//! Consumer tick driver
//!
//! Drives the scheduler's queues and the registry's periodic work from one
//! logical consumer context. Every tick body runs on the task that awaits
//! [`ConsumerLoop::run_until`], so closures and event handlers never run
//! concurrently with each other.
//!
//! Two ways to host it:
//! - inside an existing runtime: `tokio::spawn(consumer.run_until(rx))`
//! - on a dedicated OS thread with its own current-thread runtime:
//!   [`ConsumerLoop::spawn_thread`]
//!
//! Consumer identity follows the loop's task, not the worker polling it,
//! so a multi-thread runtime can host the loop without other tasks on the
//! same worker passing for the consumer. The dedicated thread is also bound
//! by OS thread id.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cadence_common::task::describe_panic;
use tokio::sync::watch;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::registry::ComponentRegistry;
use crate::scheduler::Scheduler;

/// Name of the OS thread started by [`ConsumerLoop::spawn_thread`]
pub const CONSUMER_THREAD_NAME: &str = "cadence-consumer";

/// Timers never run faster than this
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Periodic driver for a scheduler and, optionally, a registry
pub struct ConsumerLoop {
    scheduler: Arc<Scheduler>,
    registry: Option<Arc<ComponentRegistry>>,
}

impl ConsumerLoop {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            registry: None,
        }
    }

    /// Also drain the registry's event bus and run its liveness checks
    pub fn with_registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Tick until `shutdown` becomes `true` or its sender is dropped
    ///
    /// The loop runs inside the scheduler's consumer scope, so tasks it
    /// executes see [`Scheduler::is_consumer_thread`] as true.
    pub async fn run_until(self, shutdown: watch::Receiver<bool>) {
        let scheduler = Arc::clone(&self.scheduler);
        scheduler.consumer_scope(self.tick_loop(shutdown)).await;
    }

    async fn tick_loop(self, mut shutdown: watch::Receiver<bool>) {
        let settings = self.scheduler.settings().clone();

        let mut immediate = timer(settings.update_interval());
        let mut delayed = timer(settings.delayed_interval());
        let mut batch = timer(settings.batch_interval());
        let mut stats = settings.stats_interval().map(timer);

        let (mut events, mut liveness, mut performance) = match &self.registry {
            Some(registry) => {
                let s = registry.settings();
                (
                    Some(timer(s.event_interval())),
                    Some(timer(s.liveness_interval())),
                    s.performance_interval().map(timer),
                )
            }
            None => (None, None, None),
        };

        info!(
            "Consumer loop started (update={}ms, delayed={}ms, batch={}ms, registry={})",
            settings.update_interval_ms,
            settings.delayed_interval_ms,
            settings.batch_interval_ms,
            self.registry.is_some()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Consumer loop: shutdown sender dropped");
                        break;
                    }
                }
                _ = immediate.tick() => {
                    self.scheduler.process_immediate();
                }
                _ = delayed.tick() => {
                    self.scheduler.process_delayed();
                }
                _ = batch.tick() => {
                    self.scheduler.process_batch();
                }
                _ = maybe_tick(&mut events) => {
                    if let Some(registry) = &self.registry {
                        registry.process_events();
                    }
                }
                _ = maybe_tick(&mut liveness) => {
                    if let Some(registry) = &self.registry {
                        registry.check_liveness();
                    }
                }
                _ = maybe_tick(&mut performance) => {
                    if let Some(registry) = &self.registry {
                        registry.sample_performance();
                    }
                }
                _ = maybe_tick(&mut stats) => {
                    self.scheduler.emit_statistics();
                }
            }
        }

        info!("Consumer loop stopped");
    }

    /// Run the loop on a dedicated OS thread
    pub fn spawn_thread(self) -> Result<ConsumerHandle> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let thread = std::thread::Builder::new()
            .name(CONSUMER_THREAD_NAME.to_string())
            .spawn(move || {
                let scheduler = Arc::clone(&self.scheduler);
                scheduler.bind_consumer_thread();
                runtime.block_on(self.run_until(shutdown_rx));
                scheduler.unbind_consumer_thread();
            })?;

        Ok(ConsumerHandle {
            shutdown: shutdown_tx,
            thread: Some(thread),
        })
    }
}

/// Control handle for a consumer thread
///
/// Dropping the handle signals shutdown without waiting for the thread.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl ConsumerHandle {
    /// Ask the loop to stop after its current tick
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for the thread to exit
    pub fn join(mut self) -> Result<()> {
        self.shutdown();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|payload| Error::Consumer(describe_panic(payload.as_ref()))),
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn timer(period: Duration) -> Interval {
    let mut timer = interval(period.max(MIN_PERIOD));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Tick an optional timer; a disabled timer never fires
async fn maybe_tick(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use cadence_common::config::SchedulerSettings;
    use cadence_common::Priority;
    use std::sync::mpsc;

    fn fast_scheduler() -> Arc<Scheduler> {
        let settings = SchedulerSettings {
            update_interval_ms: 2,
            delayed_interval_ms: 5,
            batch_interval_ms: 5,
            ..SchedulerSettings::default()
        };
        Arc::new(Scheduler::new(SchedulerConfig::from_settings(settings)))
    }

    #[test]
    fn test_tasks_run_on_consumer_thread() {
        let scheduler = fast_scheduler();
        let handle = ConsumerLoop::new(Arc::clone(&scheduler))
            .spawn_thread()
            .expect("spawn consumer");

        let (tx, rx) = mpsc::channel();
        std::thread::spawn({
            let scheduler = Arc::clone(&scheduler);
            move || {
                scheduler.schedule_immediate("whoami", Priority::NORMAL, move || {
                    let name = std::thread::current().name().map(str::to_string);
                    let _ = tx.send(name);
                });
            }
        })
        .join()
        .expect("producer");

        let name = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("task ran");
        assert_eq!(name.as_deref(), Some(CONSUMER_THREAD_NAME));

        handle.join().expect("join");
        assert!(!scheduler.is_consumer_thread());
    }

    #[test]
    fn test_delayed_task_waits_for_deadline() {
        let scheduler = fast_scheduler();
        let handle = ConsumerLoop::new(Arc::clone(&scheduler))
            .spawn_thread()
            .expect("spawn consumer");

        let (tx, rx) = mpsc::channel();
        let scheduled_at = std::time::Instant::now();
        scheduler.schedule_delayed("later", 50, Priority::NORMAL, move || {
            let _ = tx.send(std::time::Instant::now());
        });

        let ran_at = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("delayed task ran");
        assert!(ran_at.duration_since(scheduled_at) >= Duration::from_millis(50));

        handle.join().expect("join");
    }

    #[test]
    fn test_drop_handle_stops_thread() {
        let scheduler = fast_scheduler();
        let handle = ConsumerLoop::new(Arc::clone(&scheduler))
            .spawn_thread()
            .expect("spawn consumer");
        assert!(!handle.is_finished());

        handle.shutdown();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_run_until_inside_runtime() {
        let scheduler = fast_scheduler();
        let registry = Arc::new(ComponentRegistry::with_defaults());
        let (tx, rx) = watch::channel(false);

        let consumer = ConsumerLoop::new(Arc::clone(&scheduler)).with_registry(Arc::clone(&registry));
        let task = tokio::spawn(consumer.run_until(rx));

        let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
        for i in 0..3 {
            let done_tx = done_tx.clone();
            scheduler.schedule_immediate(format!("t{}", i), Priority::NORMAL, move || {
                let _ = done_tx.send(i);
            });
        }

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let i = tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
                .await
                .expect("tick within timeout")
                .expect("channel open");
            seen.push(i);
        }
        assert_eq!(seen, vec![0, 1, 2]);

        tx.send(true).expect("send shutdown");
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("loop exits")
            .expect("loop task");
    }
}
