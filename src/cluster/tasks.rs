//! Background task orchestration for node roles.
//!
//! Each role (leader, follower, candidate) runs one or more background
//! loops. `RoleTaskRegistry` owns those loops so a role change can stop
//! every loop of the old role, and wait for them, before the new role's
//! loops start. Two heartbeat loops can therefore never overlap in one
//! process.
//!
//! # Example
//!
//! ```rust,no_run
//! use kafkaesque_controller::cluster::tasks::RoleTaskRegistry;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = RoleTaskRegistry::new();
//!
//!     registry.spawn_periodic("heartbeat", Duration::from_secs(2), |_tick| async {
//!         // push heartbeats
//!     });
//!
//!     // Role change: stop everything, then spawn the next role's loops
//!     registry.stop_all(Duration::from_secs(2)).await;
//!
//!     registry.shutdown(Duration::from_secs(2)).await;
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Outcome of [`RoleTaskRegistry::stop_all`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    /// Tasks that returned or observed the stop signal in time.
    pub stopped: usize,
    /// Tasks aborted after the timeout.
    pub aborted: usize,
    pub panicked: usize,
}

/// Registry of the current role's background tasks.
///
/// Tasks spawned between two `stop_all` calls form one generation; the
/// generation number is attached to every log line a task emits about its
/// lifecycle, and the node stamps role events with it to discard events
/// raised by a role that has since been replaced.
pub struct RoleTaskRegistry {
    tasks: HashMap<&'static str, JoinHandle<()>>,
    stop_tx: broadcast::Sender<()>,
    generation: u64,
    closed: bool,
}

impl Default for RoleTaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleTaskRegistry {
    pub fn new() -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            tasks: HashMap::new(),
            stop_tx,
            generation: 0,
            closed: false,
        }
    }

    /// Spawn a named task into the current generation.
    ///
    /// The task races the generation's stop signal, so it is dropped at its
    /// next await point once [`stop_all`](Self::stop_all) runs. A task
    /// already registered under `name` is aborted first.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed {
            tracing::warn!(task = name, "Registry closed, task not spawned");
            return;
        }

        if let Some(previous) = self.tasks.remove(name) {
            previous.abort();
        }

        let generation = self.generation;
        let mut stop_rx = self.stop_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task => tracing::debug!(task = name, generation, "Role task returned"),
                _ = stop_rx.recv() => tracing::debug!(task = name, generation, "Role task stopped"),
            }
        });

        tracing::debug!(task = name, generation, "Spawned role task");
        self.tasks.insert(name, handle);
    }

    /// Spawn a task that calls `task` with the tick number every `interval`.
    ///
    /// The first tick fires immediately; a slow tick pushes the next one
    /// back rather than bursting.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, interval: Duration, mut task: F)
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        self.spawn(name, async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            for tick in 0u64.. {
                ticker.tick().await;
                task(tick).await;
            }
        });
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Registered task names, sorted.
    pub fn task_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tasks.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Current generation; bumped by every `stop_all`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Signal every task of the current generation, wait up to `timeout`
    /// for all of them, abort the rest, then open a new generation.
    pub async fn stop_all(&mut self, timeout: Duration) -> StopReport {
        let mut report = StopReport::default();
        if !self.tasks.is_empty() {
            let _ = self.stop_tx.send(());
            let deadline = tokio::time::Instant::now() + timeout;

            for (name, handle) in self.tasks.drain() {
                let abort = handle.abort_handle();
                match tokio::time::timeout_at(deadline, handle).await {
                    Ok(Ok(())) => report.stopped += 1,
                    Ok(Err(e)) if e.is_cancelled() => report.stopped += 1,
                    Ok(Err(e)) => {
                        tracing::warn!(task = name, error = %e, "Role task panicked");
                        report.panicked += 1;
                    }
                    Err(_) => {
                        tracing::warn!(task = name, "Role task ignored stop signal, aborting");
                        abort.abort();
                        report.aborted += 1;
                    }
                }
            }

            tracing::debug!(
                generation = self.generation,
                stopped = report.stopped,
                aborted = report.aborted,
                "Stopped role tasks"
            );
        }

        let (stop_tx, _) = broadcast::channel(1);
        self.stop_tx = stop_tx;
        self.generation += 1;
        report
    }

    /// Stop every task and refuse further spawns.
    pub async fn shutdown(&mut self, timeout: Duration) -> StopReport {
        self.closed = true;
        self.stop_all(timeout).await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.closed
    }
}

impl Drop for RoleTaskRegistry {
    fn drop(&mut self) {
        for handle in self.tasks.values() {
            handle.abort();
        }
    }
}
