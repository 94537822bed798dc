//! Multi-node cluster tests.
//!
//! Nodes run in one process over the in-memory transport and share a
//! `MemoryDirectoryStore`. Timings are scaled down so a heartbeat timeout
//! plus the longest election backoff fits in well under a second.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test cluster_tests
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use kafkaesque_controller::cluster::{
    ControllerConfig, ControllerHandler, ControllerNode, InMemoryTransport, JournalAction,
    MemoryDirectoryStore, NodeRole,
};
use kafkaesque_controller::prelude::*;

// ============================================================================
// Test Infrastructure
// ============================================================================

const HEARTBEAT: Duration = Duration::from_millis(50);
const TIMEOUT: Duration = Duration::from_millis(300);
const BACKOFF_MAX: Duration = Duration::from_millis(60);

/// Upper bound for any single convergence wait.
const PATIENCE: Duration = Duration::from_secs(5);

fn config(id: &str) -> ControllerConfig {
    ControllerConfig {
        node_id: NodeId::new(id),
        heartbeat_interval: HEARTBEAT,
        monitor_interval: Duration::from_millis(20),
        heartbeat_timeout: TIMEOUT,
        election_backoff_min: Duration::from_millis(10),
        election_backoff_max: BACKOFF_MAX,
        rpc_timeout: Duration::from_millis(200),
        ..ControllerConfig::default()
    }
}

/// Nodes sharing one directory and one in-memory network.
struct TestCluster {
    directory: MemoryDirectoryStore,
    transport: Arc<InMemoryTransport>,
    nodes: Vec<Arc<ControllerNode>>,
}

impl TestCluster {
    /// Start `ids` in order; the first one claims leadership.
    async fn start(ids: &[&str]) -> Self {
        let mut cluster = Self {
            directory: MemoryDirectoryStore::new(),
            transport: Arc::new(InMemoryTransport::new()),
            nodes: Vec::new(),
        };
        for id in ids {
            cluster.add(id).await;
        }
        cluster
    }

    async fn add(&mut self, id: &str) -> Arc<ControllerNode> {
        let node = ControllerNode::new(
            config(id),
            Arc::new(self.directory.clone()),
            self.transport.clone(),
        );
        self.transport.register(NodeId::new(id), &node);
        node.start().await.expect("node should start");
        self.nodes.push(node.clone());
        node
    }

    fn node(&self, id: &str) -> Arc<ControllerNode> {
        self.nodes
            .iter()
            .find(|n| n.node_id().as_str() == id)
            .cloned()
            .expect("unknown node")
    }

    /// Simulate a crash: stop the node and make it unreachable.
    async fn kill(&self, id: &str) {
        let node = self.node(id);
        self.transport.set_reachable(node.node_id(), false);
        node.shutdown().await;
    }

    async fn recorded_leader(&self) -> Option<NodeId> {
        self.directory.snapshot().await.and_then(|d| d.leader_id)
    }

    async fn shutdown(&self) {
        for node in &self.nodes {
            node.shutdown().await;
        }
    }
}

/// Poll `check` until it holds or `within` elapses.
async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

async fn same_store(a: &ControllerNode, b: &ControllerNode) -> bool {
    a.handle_metadata_fetch().await == b.handle_metadata_fetch().await
}

/// Whether `node` leads (if it is `leader`) or follows `leader`.
async fn settled_on(node: &ControllerNode, leader: &NodeId) -> bool {
    match node.role().await {
        Some(NodeRole::Leader(_)) => node.node_id() == leader,
        Some(NodeRole::Follower(state)) => &state.leader_id == leader,
        _ => false,
    }
}

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_first_node_leads_and_others_follow() {
    let cluster = TestCluster::start(&["a", "b", "c"]).await;

    assert!(cluster.node("a").is_leader().await);
    assert_eq!(
        cluster.node("b").role().await,
        Some(NodeRole::follower(NodeId::new("a")))
    );

    let directory = cluster.directory.clone();
    let registered = eventually(PATIENCE, || {
        let directory = directory.clone();
        async move {
            directory
                .snapshot()
                .await
                .is_some_and(|d| d.follower_ids.len() == 2)
        }
    })
    .await;
    assert!(registered, "both followers should register");

    let snapshot = cluster.directory.snapshot().await.unwrap();
    assert_eq!(snapshot.leader_id, Some(NodeId::new("a")));
    assert!(!snapshot.is_follower(&NodeId::new("a")));
    assert!(!snapshot.election_in_progress);

    cluster.shutdown().await;
}

// ============================================================================
// Heartbeat Replication
// ============================================================================

#[tokio::test]
async fn test_follower_store_converges_after_tick() {
    let cluster = TestCluster::start(&["a", "b"]).await;
    let a = cluster.node("a");
    let b = cluster.node("b");

    let topic_uuid = a
        .handle_register_topic(TopicRegistration::new("orders"))
        .await
        .unwrap();

    let converged = eventually(PATIENCE, || {
        let b = b.clone();
        async move {
            b.handle_get_topic("orders")
                .await
                .is_some_and(|t| t.topic_uuid == topic_uuid)
        }
    })
    .await;
    assert!(converged, "follower should receive the topic within a tick");
    assert!(same_store(&a, &b).await);

    assert!(a.journal().count(JournalAction::Sent, b.node_id()).await >= 1);
    assert!(b.journal().count(JournalAction::Received, a.node_id()).await >= 1);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_follower_writes_are_overwritten_by_leader() {
    let cluster = TestCluster::start(&["a", "b"]).await;
    let a = cluster.node("a");
    let b = cluster.node("b");

    // A write applied on a follower only lasts until the next heartbeat.
    b.handle_register_topic(TopicRegistration::new("local-only"))
        .await
        .unwrap();

    let overwritten = eventually(PATIENCE, || {
        let b = b.clone();
        async move { b.handle_get_topic("local-only").await.is_none() }
    })
    .await;
    assert!(overwritten);
    assert!(same_store(&a, &b).await);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_follower_does_not_block_round() {
    let cluster = TestCluster::start(&["a", "b", "c"]).await;
    let a = cluster.node("a");
    let c = cluster.node("c");

    let registered = eventually(PATIENCE, || {
        let directory = cluster.directory.clone();
        async move {
            directory
                .snapshot()
                .await
                .is_some_and(|d| d.follower_ids.len() == 2)
        }
    })
    .await;
    assert!(registered);

    cluster.kill("b").await;
    a.handle_register_topic(TopicRegistration::new("orders"))
        .await
        .unwrap();

    let converged = eventually(PATIENCE, || {
        let c = c.clone();
        async move { c.handle_get_topic("orders").await.is_some() }
    })
    .await;
    assert!(converged);
    assert!(a.is_leader().await);

    cluster.shutdown().await;
}

// ============================================================================
// Election
// ============================================================================

#[tokio::test]
async fn test_new_leader_elected_after_leader_dies() {
    let cluster = &TestCluster::start(&["a", "b", "c"]).await;
    cluster.kill("a").await;

    let started = Instant::now();
    let elected = eventually(PATIENCE, move || async move {
        matches!(cluster.recorded_leader().await, Some(ref id) if id.as_str() != "a")
    })
    .await;
    assert!(elected, "a surviving node should take over");
    assert!(started.elapsed() < TIMEOUT + BACKOFF_MAX + Duration::from_secs(2));

    // Every survivor settles on the recorded leader.
    let settled = eventually(PATIENCE, move || async move {
        let Some(leader) = cluster.recorded_leader().await else {
            return false;
        };
        settled_on(&cluster.node("b"), &leader).await && settled_on(&cluster.node("c"), &leader).await
    })
    .await;
    assert!(settled);

    let directory = cluster.directory.snapshot().await.unwrap();
    assert!(!directory.election_in_progress);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_new_leader_replicates_to_remaining_follower() {
    let cluster = &TestCluster::start(&["a", "b", "c"]).await;
    cluster
        .node("a")
        .handle_register_topic(TopicRegistration::new("before"))
        .await
        .unwrap();

    let replicated = eventually(PATIENCE, move || async move {
        cluster.node("b").handle_get_topic("before").await.is_some()
            && cluster.node("c").handle_get_topic("before").await.is_some()
    })
    .await;
    assert!(replicated);

    cluster.kill("a").await;
    let elected = eventually(PATIENCE, move || async move {
        matches!(cluster.recorded_leader().await, Some(ref id) if id.as_str() != "a")
    })
    .await;
    assert!(elected);

    let leader_id = cluster.recorded_leader().await.unwrap();
    let leader = cluster.node(leader_id.as_str());
    let other = cluster.node(if leader_id.as_str() == "b" { "c" } else { "b" });

    let leading = eventually(PATIENCE, || {
        let leader = leader.clone();
        async move { leader.is_leader().await }
    })
    .await;
    assert!(leading);

    // Metadata from the old leader survives the failover.
    assert!(leader.handle_get_topic("before").await.is_some());

    leader
        .handle_register_topic(TopicRegistration::new("after"))
        .await
        .unwrap();
    let converged = eventually(PATIENCE, || {
        let other = other.clone();
        async move { other.handle_get_topic("after").await.is_some() }
    })
    .await;
    assert!(converged);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_stale_leader_steps_down() {
    let cluster = &TestCluster::start(&["a", "b"]).await;
    let a = &cluster.node("a");
    let b = &cluster.node("b");

    let registered = eventually(PATIENCE, move || async move {
        cluster
            .directory
            .snapshot()
            .await
            .is_some_and(|d| d.is_follower(&NodeId::new("b")))
    })
    .await;
    assert!(registered);

    // Partition b away: a keeps running but its heartbeats stop arriving.
    cluster.transport.set_reachable(b.node_id(), false);

    let b_took_over = eventually(PATIENCE, move || async move {
        cluster.recorded_leader().await == Some(NodeId::new("b"))
    })
    .await;
    assert!(b_took_over);

    let a_stepped_down = eventually(PATIENCE, move || async move {
        a.role().await == Some(NodeRole::follower(NodeId::new("b")))
    })
    .await;
    assert!(a_stepped_down, "a should follow b once the directory names b");

    // Heal: a registers with b and starts receiving its heartbeats.
    cluster.transport.set_reachable(b.node_id(), true);
    let healed = eventually(PATIENCE, move || async move {
        cluster
            .directory
            .snapshot()
            .await
            .is_some_and(|d| d.is_follower(&NodeId::new("a")))
            && a.journal().count(JournalAction::Received, b.node_id()).await >= 1
    })
    .await;
    assert!(healed);
    assert!(b.is_leader().await);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_late_joiner_follows_current_leader() {
    let mut cluster = TestCluster::start(&["a", "b"]).await;
    cluster
        .node("a")
        .handle_register_topic(TopicRegistration::new("orders"))
        .await
        .unwrap();

    let c = cluster.add("c").await;
    assert_eq!(c.role().await, Some(NodeRole::follower(NodeId::new("a"))));

    let caught_up = eventually(PATIENCE, || {
        let c = c.clone();
        async move { c.handle_get_topic("orders").await.is_some() }
    })
    .await;
    assert!(caught_up);

    cluster.shutdown().await;
}
