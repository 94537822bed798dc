//! Registration surface tests.
//!
//! Exercises the registration, lookup and fetch operations through the
//! `ControllerHandler` implementation of a running single-node cluster.

use std::sync::Arc;
use std::time::Duration;

use kafkaesque_controller::cluster::metadata::BrokerStatus;
use kafkaesque_controller::cluster::{
    ClusterError, ControllerConfig, ControllerHandler, ControllerNode, InMemoryTransport,
    MemoryDirectoryStore,
};
use kafkaesque_controller::prelude::*;
use tempfile::TempDir;
use uuid::Uuid;

// ============================================================================
// Test Infrastructure
// ============================================================================

fn config(id: &str) -> ControllerConfig {
    ControllerConfig {
        node_id: NodeId::new(id),
        heartbeat_interval: Duration::from_millis(100),
        monitor_interval: Duration::from_millis(50),
        heartbeat_timeout: Duration::from_millis(500),
        ..ControllerConfig::default()
    }
}

async fn leader() -> Arc<ControllerNode> {
    let node = ControllerNode::new(
        config("a"),
        Arc::new(MemoryDirectoryStore::new()),
        Arc::new(InMemoryTransport::new()),
    );
    node.start().await.expect("node should start");
    node
}

fn broker(id: i32) -> BrokerRegistration {
    BrokerRegistration {
        broker_id: BrokerId(id),
        broker_host: "h".to_string(),
        broker_port: 9092,
        security_protocol: "PLAINTEXT".to_string(),
        rack_id: "r1".to_string(),
    }
}

fn partition(id: i32, topic_uuid: Uuid) -> PartitionRegistration {
    PartitionRegistration {
        partition_id: PartitionId(id),
        topic_uuid,
        replicas: vec![NodeId::new("1"), NodeId::new("2")],
        isr: vec![NodeId::new("1")],
        leader: NodeId::new("1"),
        removing_replicas: vec![],
        adding_replicas: vec![],
        partition_epoch: 0,
    }
}

// ============================================================================
// Brokers
// ============================================================================

#[tokio::test]
async fn test_duplicate_broker_registration_returns_same_uuid() {
    let node = leader().await;

    let first = node.handle_register_broker(broker(1)).await.unwrap();
    let second = node.handle_register_broker(broker(1)).await.unwrap();
    assert_eq!(first, second);

    let brokers = node.handle_get_all_brokers().await;
    assert_eq!(brokers.len(), 1);
    assert_eq!(brokers[0].epoch, 0);
    assert_eq!(brokers[0].broker_status, BrokerStatus::Alive);
    assert_eq!(brokers[0].internal_uuid, first);

    node.shutdown().await;
}

#[tokio::test]
async fn test_broker_change_bumps_epoch_and_status() {
    let node = leader().await;
    node.handle_register_broker(broker(1)).await.unwrap();

    let epoch = node
        .handle_register_broker_change(BrokerChange::status(BrokerId(1), BrokerStatus::Draining))
        .await
        .unwrap();
    assert_eq!(epoch, Some(1));

    let record = node.handle_get_broker(BrokerId(1)).await.unwrap();
    assert_eq!(record.epoch, 1);
    assert_eq!(record.broker_status, BrokerStatus::Draining);

    let changes = node.handle_get_broker_changes().await;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].epoch, 1);
    assert_eq!(changes[0].broker_status, Some(BrokerStatus::Draining));

    node.shutdown().await;
}

#[tokio::test]
async fn test_epoch_counts_only_accepted_changes() {
    let node = leader().await;
    node.handle_register_broker(broker(1)).await.unwrap();

    for _ in 0..3 {
        let change = BrokerChange {
            broker_id: BrokerId(1),
            broker_port: Some(9093),
            ..BrokerChange::default()
        };
        node.handle_register_broker_change(change).await.unwrap();
    }
    let rejected = node
        .handle_register_broker_change(BrokerChange::status(BrokerId(7), BrokerStatus::Fenced))
        .await
        .unwrap();
    assert_eq!(rejected, None);

    let record = node.handle_get_broker(BrokerId(1)).await.unwrap();
    assert_eq!(record.epoch, 3);
    assert_eq!(record.broker_port, 9093);
    assert_eq!(node.handle_get_broker_changes().await.len(), 3);
    assert!(node.handle_get_broker(BrokerId(7)).await.is_none());

    node.shutdown().await;
}

#[tokio::test]
async fn test_delete_broker() {
    let node = leader().await;
    node.handle_register_broker(broker(1)).await.unwrap();

    let deleted = node.handle_delete_broker(BrokerId(1)).await.unwrap();
    assert_eq!(deleted.map(|b| b.broker_id), Some(BrokerId(1)));
    assert!(node.handle_delete_broker(BrokerId(1)).await.unwrap().is_none());
    assert!(node.handle_get_all_brokers().await.is_empty());

    node.shutdown().await;
}

#[tokio::test]
async fn test_invalid_broker_is_rejected_before_store() {
    let node = leader().await;

    let mut bad = broker(1);
    bad.broker_port = 70000;
    let err = node.handle_register_broker(bad).await.unwrap_err();
    assert!(matches!(err, ClusterError::Validation(_)));

    let mut bad = broker(1);
    bad.broker_host = String::new();
    assert!(node.handle_register_broker(bad).await.is_err());

    assert!(node.handle_get_all_brokers().await.is_empty());
    node.shutdown().await;
}

// ============================================================================
// Topics and Partitions
// ============================================================================

#[tokio::test]
async fn test_topic_registration_is_idempotent_by_name() {
    let node = leader().await;

    let first = node
        .handle_register_topic(TopicRegistration::new("orders"))
        .await
        .unwrap();
    let second = node
        .handle_register_topic(TopicRegistration::new("orders"))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(node.handle_get_all_topics().await.len(), 1);
    assert_eq!(node.handle_get_topic("orders").await.unwrap().topic_uuid, first);

    let err = node
        .handle_register_topic(TopicRegistration::new("bad topic"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::Validation(_)));

    assert!(node.handle_delete_topic("orders").await.unwrap().is_some());
    assert!(node.handle_get_topic("orders").await.is_none());
    node.shutdown().await;
}

#[tokio::test]
async fn test_partition_registration_is_idempotent_by_id() {
    let node = leader().await;
    let topic = node
        .handle_register_topic(TopicRegistration::new("orders"))
        .await
        .unwrap();

    assert_eq!(
        node.handle_register_partition(partition(0, topic)).await.unwrap(),
        PartitionId(0)
    );
    node.handle_register_partition(partition(0, topic)).await.unwrap();
    node.handle_register_partition(partition(1, topic)).await.unwrap();
    assert_eq!(node.handle_get_all_partitions().await.len(), 2);

    let record = node.handle_get_partition(PartitionId(1)).await.unwrap();
    assert_eq!(record.topic_uuid, topic);
    assert_eq!(record.leader, NodeId::new("1"));

    assert!(node.handle_delete_partition(PartitionId(1)).await.unwrap().is_some());
    assert!(node.handle_delete_partition(PartitionId(1)).await.unwrap().is_none());
    node.shutdown().await;
}

#[tokio::test]
async fn test_partition_leader_must_be_a_replica() {
    let node = leader().await;

    let mut bad = partition(0, Uuid::new_v4());
    bad.leader = NodeId::new("9");
    assert!(matches!(
        node.handle_register_partition(bad).await,
        Err(ClusterError::Validation(_))
    ));

    let mut bad = partition(0, Uuid::new_v4());
    bad.isr = vec![NodeId::new("3")];
    assert!(node.handle_register_partition(bad).await.is_err());

    assert!(node.handle_get_all_partitions().await.is_empty());
    node.shutdown().await;
}

// ============================================================================
// Producers
// ============================================================================

#[tokio::test]
async fn test_producer_requires_known_broker() {
    let node = leader().await;

    let status = node
        .handle_register_producer(ProducerRegistration {
            broker_id: BrokerId(5),
            producer_id: ProducerId(100),
        })
        .await
        .unwrap();
    assert_eq!(status, ProducerStatus::BrokerNotRecognized);
    assert!(node.handle_get_all_producers().await.is_empty());

    node.shutdown().await;
}

#[tokio::test]
async fn test_producer_stamped_with_broker_epoch() {
    let node = leader().await;
    node.handle_register_broker(broker(1)).await.unwrap();
    node.handle_register_broker_change(BrokerChange::status(BrokerId(1), BrokerStatus::Alive))
        .await
        .unwrap();

    let registration = ProducerRegistration {
        broker_id: BrokerId(1),
        producer_id: ProducerId(100),
    };
    let status = node.handle_register_producer(registration).await.unwrap();
    assert_eq!(status, ProducerStatus::Registered { broker_epoch: 1 });

    // Same pair again: no new record.
    node.handle_register_producer(registration).await.unwrap();
    assert_eq!(node.handle_get_all_producers().await.len(), 1);

    let record = node
        .handle_get_producer(BrokerId(1), ProducerId(100))
        .await
        .unwrap();
    assert_eq!(record.broker_epoch, 1);

    let deleted = node
        .handle_delete_producer(BrokerId(1), ProducerId(100))
        .await
        .unwrap();
    assert!(deleted.is_some());
    assert!(node.handle_get_producer(BrokerId(1), ProducerId(100)).await.is_none());

    node.shutdown().await;
}

// ============================================================================
// Fetch
// ============================================================================

#[tokio::test]
async fn test_metadata_fetch_client_and_full_fetch() {
    let node = leader().await;
    node.handle_register_broker(broker(1)).await.unwrap();
    let topic = node
        .handle_register_topic(TopicRegistration::new("orders"))
        .await
        .unwrap();
    node.handle_register_partition(partition(0, topic)).await.unwrap();
    node.handle_register_producer(ProducerRegistration {
        broker_id: BrokerId(1),
        producer_id: ProducerId(1),
    })
    .await
    .unwrap();

    let client = node.handle_metadata_fetch_client().await;
    assert_eq!(client.brokers.len(), 1);
    assert_eq!(client.topics.len(), 1);
    assert_eq!(client.partitions.len(), 1);
    assert!(client.broker_changes.is_empty());

    let full = node.handle_metadata_fetch().await;
    assert_eq!(full.producers.len(), 1);
    assert_eq!(full.record_count(), 4);
    assert!(!full.topics.timestamp.is_empty());

    node.shutdown().await;
}

#[tokio::test]
async fn test_persistent_node_writes_store_and_journal_files() {
    let dir = TempDir::new().unwrap();
    let config = ControllerConfig {
        data_path: dir.path().to_path_buf(),
        directory_path: dir.path().join("cluster.json"),
        ..config("127.0.0.1:7001")
    };
    let metadata_path = config.metadata_file_path();
    let journal_path = config.journal_file_path();

    let node = ControllerNode::persistent(
        config,
        Arc::new(MemoryDirectoryStore::new()),
        Arc::new(InMemoryTransport::new()),
    );
    node.start().await.unwrap();
    node.handle_register_topic(TopicRegistration::new("orders"))
        .await
        .unwrap();

    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&metadata_path).unwrap()).unwrap();
    assert_eq!(on_disk["TopicRecord"]["records"][0]["name"], "orders");
    // Fresh on start; a lone leader sends no heartbeats.
    assert!(std::fs::read_to_string(&journal_path).unwrap().is_empty());

    node.shutdown().await;
}
