//! A controller node.
//!
//! A [`ControllerNode`] owns the node-local state (metadata store, event
//! journal, current role) and runs the loops of its current role:
//!
//! - Leader: `leader_heartbeat` pushes the full store to every follower
//!   once per heartbeat interval
//! - Follower: `follower_register` announces the node to its leader until
//!   accepted, `follower_monitor` watches for leader silence
//! - Candidate: `election` runs the randomized-backoff election
//!
//! Role loops never change the role themselves. They send a [`RoleEvent`]
//! to the supervisor task, which stops every loop of the old role before
//! starting the loops of the new one. Each event is stamped with the role
//! generation it was raised under; the supervisor drops events from an
//! earlier generation, so a loop that was already stopping cannot act on a
//! role it no longer belongs to.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::config::ControllerConfig;
use super::directory::{DirectoryStore, FileDirectoryStore, read_or_init};
use super::error::{ClusterError, ClusterResult};
use super::failure_detector::LeaderMonitor;
use super::handler::ControllerHandler;
use super::metadata::{EventJournal, JournalAction, MetadataStore, MetadataStoreHandle};
use super::role::{NodeRole, RoleEvent, transition};
use super::tasks::RoleTaskRegistry;
use super::transport::{PeerTransport, TcpTransport};
use crate::constants::ROLE_TASK_STOP_TIMEOUT_MS;
use crate::types::NodeId;

/// A role event and the generation of the role that raised it.
type StampedEvent = (u64, RoleEvent);

/// One member of the controller cluster.
pub struct ControllerNode {
    node_id: NodeId,
    config: ControllerConfig,
    directory: Arc<dyn DirectoryStore>,
    metadata: MetadataStoreHandle,
    journal: EventJournal,
    transport: Arc<dyn PeerTransport>,
    /// `None` before start and after shutdown.
    role: RwLock<Option<NodeRole>>,
    /// Task generation of the current role. Written after `role`.
    generation: AtomicU64,
    events_tx: mpsc::UnboundedSender<StampedEvent>,
    /// Taken by the supervisor on start.
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<StampedEvent>>>,
    tasks: Mutex<RoleTaskRegistry>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ControllerNode {
    /// A node whose metadata store and journal live only in memory.
    pub fn new(
        config: ControllerConfig,
        directory: Arc<dyn DirectoryStore>,
        transport: Arc<dyn PeerTransport>,
    ) -> Arc<Self> {
        Self::with_stores(
            config,
            directory,
            transport,
            MetadataStoreHandle::in_memory(),
            EventJournal::in_memory(),
        )
    }

    /// A node that persists its store and journal under `config.data_path`.
    pub fn persistent(
        config: ControllerConfig,
        directory: Arc<dyn DirectoryStore>,
        transport: Arc<dyn PeerTransport>,
    ) -> Arc<Self> {
        let metadata = MetadataStoreHandle::persistent(config.metadata_file_path());
        let journal = EventJournal::persistent(config.journal_file_path());
        Self::with_stores(config, directory, transport, metadata, journal)
    }

    /// A fully file-backed node talking TCP to its peers.
    pub fn from_config(config: ControllerConfig) -> Arc<Self> {
        let directory = Arc::new(FileDirectoryStore::new(config.directory_path.clone()));
        let transport = Arc::new(TcpTransport::from_config(&config));
        Self::persistent(config, directory, transport)
    }

    fn with_stores(
        config: ControllerConfig,
        directory: Arc<dyn DirectoryStore>,
        transport: Arc<dyn PeerTransport>,
        metadata: MetadataStoreHandle,
        journal: EventJournal,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            node_id: config.node_id.clone(),
            config,
            directory,
            metadata,
            journal,
            transport,
            role: RwLock::new(None),
            generation: AtomicU64::new(0),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            tasks: Mutex::new(RoleTaskRegistry::new()),
            supervisor: Mutex::new(None),
        })
    }

    /// Start the node: fresh store and journal, resolve the role from the
    /// directory, start that role's loops and the supervisor.
    ///
    /// Fails if the configuration is invalid or the directory exists but
    /// cannot be read; the node is then not running.
    pub async fn start(self: &Arc<Self>) -> ClusterResult<()> {
        self.config
            .validate()
            .map_err(|errors| ClusterError::Config(errors.join("; ")))?;

        let events_rx = self
            .events_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ClusterError::Config("node already started".to_string()))?;

        self.metadata.initialize().await?;
        self.journal.initialize().await?;

        let role = self.resolve_role().await?;
        info!(node_id = %self.node_id, role = %role, "Controller node started");
        self.enter_role(role).await;

        let node = Arc::clone(self);
        let handle = tokio::spawn(node.supervise(events_rx));
        *self.supervisor.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the supervisor and every role loop.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.supervisor.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        self.tasks
            .lock()
            .await
            .shutdown(Duration::from_millis(ROLE_TASK_STOP_TIMEOUT_MS))
            .await;
        *self.role.write().await = None;
        info!(node_id = %self.node_id, "Controller node shut down");
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Current role, or `None` if the node is not running.
    pub async fn role(&self) -> Option<NodeRole> {
        self.role.read().await.clone()
    }

    pub async fn is_leader(&self) -> bool {
        self.role.read().await.as_ref().is_some_and(NodeRole::is_leader)
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    /// Names of the loops currently registered for the role.
    pub async fn running_tasks(&self) -> Vec<&'static str> {
        self.tasks.lock().await.task_names()
    }

    // ========================================================================
    // Role resolution
    // ========================================================================

    /// Decide this node's role from the directory, claiming leadership of
    /// an empty cluster.
    pub async fn resolve_role(&self) -> ClusterResult<NodeRole> {
        let leader = self.resolve_leader().await?;
        Ok(if leader == self.node_id {
            NodeRole::leader()
        } else {
            NodeRole::follower(leader)
        })
    }

    async fn resolve_leader(&self) -> ClusterResult<NodeId> {
        let mut directory = read_or_init(self.directory.as_ref()).await?;
        match directory.leader_id.clone() {
            Some(leader) => Ok(leader),
            None => {
                directory.claim_leadership(self.node_id.clone());
                self.directory.write(&directory).await?;
                info!(node_id = %self.node_id, "Claimed leadership of empty cluster");
                Ok(self.node_id.clone())
            }
        }
    }

    fn event_for_leader(&self, leader: NodeId) -> RoleEvent {
        if leader == self.node_id {
            RoleEvent::BecameLeader
        } else {
            RoleEvent::FollowLeader(leader)
        }
    }

    fn emit(&self, generation: u64, event: RoleEvent) {
        if self.events_tx.send((generation, event)).is_err() {
            debug!(node_id = %self.node_id, "Role event dropped, supervisor not running");
        }
    }

    // ========================================================================
    // Supervisor
    // ========================================================================

    async fn supervise(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<StampedEvent>) {
        while let Some((generation, event)) = events.recv().await {
            let current_generation = self.generation.load(Ordering::SeqCst);
            if generation != current_generation {
                debug!(
                    node_id = %self.node_id,
                    event = %event,
                    generation,
                    current_generation,
                    "Ignoring role event from an earlier role"
                );
                continue;
            }
            let Some(current) = self.role.read().await.clone() else {
                break;
            };
            let Some(next) = transition(&current, event.clone()) else {
                debug!(node_id = %self.node_id, role = %current, event = %event, "Ignoring role event");
                continue;
            };

            info!(
                node_id = %self.node_id,
                from = %current,
                to = %next,
                event = %event,
                "Role transition"
            );
            let report = self
                .tasks
                .lock()
                .await
                .stop_all(Duration::from_millis(ROLE_TASK_STOP_TIMEOUT_MS))
                .await;
            if report.aborted > 0 {
                warn!(node_id = %self.node_id, aborted = report.aborted, "Old role tasks had to be aborted");
            }
            self.enter_role(next).await;
        }
    }

    async fn enter_role(self: &Arc<Self>, role: NodeRole) {
        if role.is_follower() {
            self.metadata.reset_heartbeat_clock().await;
        }
        let mut tasks = self.tasks.lock().await;
        let generation = tasks.generation();
        *self.role.write().await = Some(role.clone());
        self.generation.store(generation, Ordering::SeqCst);

        match role {
            NodeRole::Leader(_) => {
                let node = Arc::clone(self);
                tasks.spawn_periodic("leader_heartbeat", self.config.heartbeat_interval, move |_| {
                    let node = Arc::clone(&node);
                    async move { node.heartbeat_tick(generation).await }
                });
            }
            NodeRole::Follower(state) => {
                tasks.spawn(
                    "follower_register",
                    Arc::clone(self).register_with_leader(state.leader_id.clone(), generation),
                );
                tasks.spawn(
                    "follower_monitor",
                    Arc::clone(self).monitor_leader(state.leader_id, generation),
                );
            }
            NodeRole::Candidate(state) => {
                tasks.spawn(
                    "election",
                    Arc::clone(self).run_election(state.previous_leader, generation),
                );
            }
        }
    }

    // ========================================================================
    // Leader
    // ========================================================================

    async fn heartbeat_tick(&self, generation: u64) {
        let mut directory = match self.directory.read().await {
            Ok(directory) => directory,
            Err(e) => {
                warn!(node_id = %self.node_id, error = %e, "Failed to read cluster directory");
                return;
            }
        };

        match directory.leader_id.clone() {
            Some(leader) if leader != self.node_id => {
                warn!(node_id = %self.node_id, leader = %leader, "Directory names another leader, stepping down");
                self.emit(generation, RoleEvent::Deposed(leader));
                return;
            }
            Some(_) => {}
            None => {
                directory.claim_leadership(self.node_id.clone());
                if let Err(e) = self.directory.write(&directory).await {
                    warn!(node_id = %self.node_id, error = %e, "Failed to re-record leadership");
                }
            }
        }

        let snapshot = self.metadata.snapshot().await;
        let sends = directory
            .follower_ids
            .iter()
            .map(|follower| self.send_heartbeat_to(follower, snapshot.clone()));
        join_all(sends).await;

        if let Some(NodeRole::Leader(state)) = self.role.write().await.as_mut() {
            state.rounds += 1;
            debug!(
                node_id = %self.node_id,
                round = state.rounds,
                followers = directory.follower_ids.len(),
                "Heartbeat round complete"
            );
        }
    }

    async fn send_heartbeat_to(&self, follower: &NodeId, snapshot: MetadataStore) {
        match self
            .transport
            .send_heartbeat(follower, &self.node_id, snapshot)
            .await
        {
            Ok(()) => self.journal.append(JournalAction::Sent, follower).await,
            Err(e) => {
                warn!(node_id = %self.node_id, follower = %follower, error = %e, "Heartbeat send failed");
            }
        }
    }

    // ========================================================================
    // Follower
    // ========================================================================

    /// Retried once per heartbeat interval: a follower the leader never
    /// recorded gets no heartbeats and would start a needless election.
    async fn register_with_leader(self: Arc<Self>, leader_id: NodeId, generation: u64) {
        loop {
            match self
                .transport
                .register_follower(&leader_id, &self.node_id)
                .await
            {
                Ok(()) => {
                    info!(node_id = %self.node_id, leader = %leader_id, "Registered with leader");
                    return;
                }
                Err(ClusterError::NotLeader {
                    leader_hint: Some(hint),
                }) if hint != leader_id && hint != self.node_id => {
                    info!(node_id = %self.node_id, leader = %hint, "Redirected to current leader");
                    self.emit(generation, RoleEvent::FollowLeader(hint));
                    return;
                }
                Err(e) => {
                    warn!(node_id = %self.node_id, leader = %leader_id, error = %e, "Failed to register with leader");
                }
            }
            tokio::time::sleep(self.config.heartbeat_interval).await;
        }
    }

    async fn monitor_leader(self: Arc<Self>, leader_id: NodeId, generation: u64) {
        let mut monitor = LeaderMonitor::new(self.config.heartbeat_monitor_config(), leader_id);
        let mut ticker = tokio::time::interval(self.config.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let since = self.metadata.since_last_heartbeat().await;
            monitor.observe(since);
            if monitor.is_failed() {
                warn!(
                    node_id = %self.node_id,
                    leader = %monitor.leader_id(),
                    silent_ms = since.as_millis() as u64,
                    "Leader heartbeat timed out"
                );
                self.emit(generation, RoleEvent::LeaderTimedOut(monitor.leader_id().clone()));
                return;
            }
        }
    }

    // ========================================================================
    // Candidate
    // ========================================================================

    async fn run_election(self: Arc<Self>, previous_leader: Option<NodeId>, generation: u64) {
        loop {
            match self.election_round(previous_leader.as_ref()).await {
                Ok(event) => {
                    self.emit(generation, event);
                    return;
                }
                Err(e) => {
                    let retry_in = self.config.random_election_backoff();
                    warn!(
                        node_id = %self.node_id,
                        error = %e,
                        retry_ms = retry_in.as_millis() as u64,
                        "Election round failed"
                    );
                    tokio::time::sleep(retry_in).await;
                }
            }
        }
    }

    async fn election_round(&self, previous_leader: Option<&NodeId>) -> ClusterResult<RoleEvent> {
        let mut directory = read_or_init(self.directory.as_ref()).await?;
        if let Some(current) = directory.leader_id.clone()
            && Some(&current) != previous_leader
        {
            info!(node_id = %self.node_id, leader = %current, "Leader already replaced, skipping election");
            return Ok(self.event_for_leader(current));
        }

        directory.election_in_progress = true;
        self.directory.write(&directory).await?;

        let backoff = self.config.random_election_backoff();
        info!(
            node_id = %self.node_id,
            backoff_ms = backoff.as_millis() as u64,
            "Election started"
        );
        tokio::time::sleep(backoff).await;

        let mut directory = read_or_init(self.directory.as_ref()).await?;
        if directory.election_in_progress {
            directory.claim_leadership(self.node_id.clone());
            self.directory.write(&directory).await?;
            info!(node_id = %self.node_id, "Won election");
        }

        let leader = self.resolve_leader().await?;
        Ok(self.event_for_leader(leader))
    }

    async fn leader_hint(&self) -> Option<NodeId> {
        let followed = self
            .role
            .read()
            .await
            .as_ref()
            .and_then(|role| role.followed_leader().cloned());
        match followed {
            Some(leader) => Some(leader),
            None => self
                .directory
                .read()
                .await
                .ok()
                .and_then(|directory| directory.leader_id),
        }
    }
}

#[async_trait]
impl ControllerHandler for ControllerNode {
    fn metadata(&self) -> &MetadataStoreHandle {
        &self.metadata
    }

    async fn handle_register_follower(&self, follower_id: NodeId) -> ClusterResult<()> {
        let role = self.role().await.ok_or(ClusterError::Shutdown)?;
        if !role.is_leader() {
            return Err(ClusterError::NotLeader {
                leader_hint: self.leader_hint().await,
            });
        }

        let mut directory = read_or_init(self.directory.as_ref()).await?;
        if !directory.add_follower(follower_id.clone()) {
            debug!(node_id = %self.node_id, follower = %follower_id, "Follower already registered");
            return Ok(());
        }
        self.directory.write(&directory).await?;
        info!(
            node_id = %self.node_id,
            follower = %follower_id,
            followers = directory.follower_ids.len(),
            "Follower registered"
        );

        let snapshot = self.metadata.snapshot().await;
        self.send_heartbeat_to(&follower_id, snapshot).await;
        Ok(())
    }

    async fn handle_heartbeat(&self, leader_id: NodeId, snapshot: MetadataStore) -> ClusterResult<()> {
        // Loaded before the role: a generation never pairs with an older role.
        let generation = self.generation.load(Ordering::SeqCst);
        let role = self.role().await.ok_or(ClusterError::Shutdown)?;
        if role.is_leader() {
            return Err(ClusterError::NotFollower);
        }

        self.metadata.install_snapshot(snapshot).await?;
        self.journal.append(JournalAction::Received, &leader_id).await;

        if let Some(followed) = role.followed_leader()
            && *followed != leader_id
        {
            info!(node_id = %self.node_id, leader = %leader_id, "Heartbeat from new leader");
            self.emit(generation, RoleEvent::FollowLeader(leader_id));
        }
        Ok(())
    }
}
