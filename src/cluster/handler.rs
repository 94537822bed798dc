//! Handler trait for controller requests.
//!
//! Implement [`ControllerHandler`] to serve the controller request surface.
//! Only the membership operations (`handle_register_follower`,
//! `handle_heartbeat`) and [`metadata`](ControllerHandler::metadata) are
//! required; every registration and fetch operation has a default that
//! acts on the local metadata store.

use async_trait::async_trait;
use uuid::Uuid;

use super::error::ClusterResult;
use super::metadata::registry::ProducerStatus;
use super::metadata::{
    BrokerChange, BrokerChangeRecord, BrokerRecord, BrokerRegistration, ClientMetadata,
    MetadataStore, MetadataStoreHandle, PartitionRecord, PartitionRegistration,
    ProducerIdsRecord, ProducerRegistration, TopicRecord, TopicRegistration,
};
use crate::types::{BrokerEpoch, BrokerId, NodeId, PartitionId, ProducerId};

/// Trait for handling controller requests.
#[async_trait]
pub trait ControllerHandler: Send + Sync {
    /// The local metadata store registration operations act on.
    fn metadata(&self) -> &MetadataStoreHandle;

    /// A follower asks to be added to the cluster.
    ///
    /// Fails with `NotLeader` on any node that is not the leader.
    async fn handle_register_follower(&self, follower_id: NodeId) -> ClusterResult<()>;

    /// The leader pushes its full store.
    ///
    /// Fails with `NotFollower` on a node that is currently leading.
    async fn handle_heartbeat(&self, leader_id: NodeId, snapshot: MetadataStore)
    -> ClusterResult<()>;

    // ========================================================================
    // Brokers
    // ========================================================================

    async fn handle_register_broker(&self, registration: BrokerRegistration) -> ClusterResult<Uuid> {
        self.metadata().register_broker(registration).await
    }

    async fn handle_get_broker(&self, broker_id: BrokerId) -> Option<BrokerRecord> {
        self.metadata().get_broker(broker_id).await
    }

    async fn handle_get_all_brokers(&self) -> Vec<BrokerRecord> {
        self.metadata().get_all_brokers().await
    }

    async fn handle_delete_broker(&self, broker_id: BrokerId) -> ClusterResult<Option<BrokerRecord>> {
        self.metadata().delete_broker(broker_id).await
    }

    async fn handle_register_broker_change(
        &self,
        change: BrokerChange,
    ) -> ClusterResult<Option<BrokerEpoch>> {
        self.metadata().register_broker_change(change).await
    }

    async fn handle_get_broker_changes(&self) -> Vec<BrokerChangeRecord> {
        self.metadata().get_broker_changes().await
    }

    // ========================================================================
    // Topics
    // ========================================================================

    async fn handle_register_topic(&self, registration: TopicRegistration) -> ClusterResult<Uuid> {
        self.metadata().register_topic(registration).await
    }

    async fn handle_get_topic(&self, name: &str) -> Option<TopicRecord> {
        self.metadata().get_topic(name).await
    }

    async fn handle_get_all_topics(&self) -> Vec<TopicRecord> {
        self.metadata().get_all_topics().await
    }

    async fn handle_delete_topic(&self, name: &str) -> ClusterResult<Option<TopicRecord>> {
        self.metadata().delete_topic(name).await
    }

    // ========================================================================
    // Partitions
    // ========================================================================

    async fn handle_register_partition(
        &self,
        registration: PartitionRegistration,
    ) -> ClusterResult<PartitionId> {
        self.metadata().register_partition(registration).await
    }

    async fn handle_get_partition(&self, partition_id: PartitionId) -> Option<PartitionRecord> {
        self.metadata().get_partition(partition_id).await
    }

    async fn handle_get_all_partitions(&self) -> Vec<PartitionRecord> {
        self.metadata().get_all_partitions().await
    }

    async fn handle_delete_partition(
        &self,
        partition_id: PartitionId,
    ) -> ClusterResult<Option<PartitionRecord>> {
        self.metadata().delete_partition(partition_id).await
    }

    // ========================================================================
    // Producers
    // ========================================================================

    async fn handle_register_producer(
        &self,
        registration: ProducerRegistration,
    ) -> ClusterResult<ProducerStatus> {
        self.metadata().register_producer(registration).await
    }

    async fn handle_get_producer(
        &self,
        broker_id: BrokerId,
        producer_id: ProducerId,
    ) -> Option<ProducerIdsRecord> {
        self.metadata().get_producer(broker_id, producer_id).await
    }

    async fn handle_get_all_producers(&self) -> Vec<ProducerIdsRecord> {
        self.metadata().get_all_producers().await
    }

    async fn handle_delete_producer(
        &self,
        broker_id: BrokerId,
        producer_id: ProducerId,
    ) -> ClusterResult<Option<ProducerIdsRecord>> {
        self.metadata().delete_producer(broker_id, producer_id).await
    }

    // ========================================================================
    // Fetch
    // ========================================================================

    async fn handle_metadata_fetch_client(&self) -> ClientMetadata {
        self.metadata().metadata_fetch_client().await
    }

    async fn handle_metadata_fetch(&self) -> MetadataStore {
        self.metadata().metadata_fetch().await
    }
}
