//! Registration operations on the local metadata store.
//!
//! These are the typed entry points the request surface calls. Each one
//! validates its input, turns it into a
//! [`MetadataCommand`](super::commands::MetadataCommand), and unwraps the
//! matching response. Lookups never fail: a missing record is `None`.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::broker::{BrokerChangeRecord, BrokerCommand, BrokerRecord, BrokerResponse, BrokerStatus};
use super::commands::MetadataResponse;
use super::partition::{PartitionCommand, PartitionRecord, PartitionResponse};
use super::producer::{ProducerCommand, ProducerIdsRecord, ProducerResponse};
use super::store::{MetadataStore, MetadataStoreHandle};
use super::topic::{TopicCommand, TopicRecord, TopicResponse};
use crate::cluster::error::{ClusterError, ClusterResult};
use crate::cluster::validation::{
    validate_broker_id, validate_host, validate_partition_id, validate_port,
    validate_replica_assignment, validate_security_protocol, validate_topic_name,
};
use crate::types::{BrokerEpoch, BrokerId, NodeId, PartitionId, ProducerId};

/// Input of `RegisterBroker`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerRegistration {
    pub broker_id: BrokerId,
    pub broker_host: String,
    pub broker_port: i32,
    pub security_protocol: String,
    pub rack_id: String,
}

impl BrokerRegistration {
    pub fn validate(&self) -> ClusterResult<()> {
        validate_broker_id(self.broker_id)?;
        validate_host(&self.broker_host)?;
        validate_port(self.broker_port)?;
        validate_security_protocol(&self.security_protocol)
    }
}

/// Input of `RegisterBrokerChange`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerChange {
    pub broker_id: BrokerId,
    #[serde(default)]
    pub broker_host: Option<String>,
    #[serde(default)]
    pub broker_port: Option<i32>,
    #[serde(default)]
    pub security_protocol: Option<String>,
    #[serde(default)]
    pub broker_status: Option<BrokerStatus>,
}

impl BrokerChange {
    /// A change that only moves the broker to `status`.
    pub fn status(broker_id: BrokerId, status: BrokerStatus) -> Self {
        Self {
            broker_id,
            broker_status: Some(status),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> ClusterResult<()> {
        validate_broker_id(self.broker_id)?;
        if let Some(host) = &self.broker_host {
            validate_host(host)?;
        }
        if let Some(port) = self.broker_port {
            validate_port(port)?;
        }
        if let Some(protocol) = &self.security_protocol {
            validate_security_protocol(protocol)?;
        }
        Ok(())
    }
}

/// Input of `RegisterTopic`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRegistration {
    pub name: String,
}

impl TopicRegistration {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn validate(&self) -> ClusterResult<()> {
        validate_topic_name(&self.name)
    }
}

/// Input of `RegisterPartition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionRegistration {
    pub partition_id: PartitionId,
    #[serde(rename = "topicUUID")]
    pub topic_uuid: Uuid,
    pub replicas: Vec<NodeId>,
    #[serde(rename = "ISR")]
    pub isr: Vec<NodeId>,
    pub leader: NodeId,
    #[serde(default)]
    pub removing_replicas: Vec<NodeId>,
    #[serde(default)]
    pub adding_replicas: Vec<NodeId>,
    #[serde(default)]
    pub partition_epoch: i32,
}

impl PartitionRegistration {
    pub fn validate(&self) -> ClusterResult<()> {
        validate_partition_id(self.partition_id)?;
        validate_replica_assignment(&self.replicas, &self.isr, &self.leader)?;
        if self.partition_epoch < 0 {
            return Err(ClusterError::Validation(format!(
                "Partition epoch must be non-negative, got {}",
                self.partition_epoch
            )));
        }
        Ok(())
    }

    fn into_record(self) -> PartitionRecord {
        PartitionRecord {
            partition_id: self.partition_id,
            topic_uuid: self.topic_uuid,
            replicas: self.replicas,
            isr: self.isr,
            removing_replicas: self.removing_replicas,
            adding_replicas: self.adding_replicas,
            leader: self.leader,
            partition_epoch: self.partition_epoch,
        }
    }
}

/// Input of `RegisterProducer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerRegistration {
    pub broker_id: BrokerId,
    pub producer_id: ProducerId,
}

impl ProducerRegistration {
    pub fn validate(&self) -> ClusterResult<()> {
        validate_broker_id(self.broker_id)
    }
}

/// Outcome of `RegisterProducer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProducerStatus {
    /// Registered (or already present) under the given broker epoch.
    Registered { broker_epoch: BrokerEpoch },
    /// The broker is unknown; nothing was stored.
    BrokerNotRecognized,
}

/// What a client needs to route requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetadata {
    pub brokers: Vec<BrokerRecord>,
    pub topics: Vec<TopicRecord>,
    pub partitions: Vec<PartitionRecord>,
    pub broker_changes: Vec<BrokerChangeRecord>,
}

fn unexpected(op: &str, response: MetadataResponse) -> ClusterError {
    ClusterError::Storage(format!("{} produced unexpected response {:?}", op, response))
}

impl MetadataStoreHandle {
    // ========================================================================
    // Brokers
    // ========================================================================

    /// Register a broker, returning its internal UUID (new or existing).
    pub async fn register_broker(&self, registration: BrokerRegistration) -> ClusterResult<Uuid> {
        registration.validate()?;
        let broker_id = registration.broker_id;
        let cmd = BrokerCommand::Register {
            internal_uuid: Uuid::new_v4(),
            broker_id,
            host: registration.broker_host,
            port: registration.broker_port,
            security_protocol: registration.security_protocol,
            rack_id: registration.rack_id,
        };
        match self.apply(cmd.into()).await? {
            MetadataResponse::Broker(BrokerResponse::Registered {
                internal_uuid,
                created,
            }) => {
                if created {
                    info!(broker_id = %broker_id, internal_uuid = %internal_uuid, "Broker registered");
                }
                Ok(internal_uuid)
            }
            other => Err(unexpected("register_broker", other)),
        }
    }

    pub async fn get_broker(&self, broker_id: BrokerId) -> Option<BrokerRecord> {
        self.read(|s| s.brokers.get(broker_id).cloned()).await
    }

    pub async fn get_all_brokers(&self) -> Vec<BrokerRecord> {
        self.read(|s| s.brokers.records.clone()).await
    }

    pub async fn delete_broker(&self, broker_id: BrokerId) -> ClusterResult<Option<BrokerRecord>> {
        match self.apply(BrokerCommand::Delete { broker_id }.into()).await? {
            MetadataResponse::Broker(BrokerResponse::Deleted(record)) => Ok(Some(record)),
            MetadataResponse::Broker(BrokerResponse::NotFound { .. }) => Ok(None),
            other => Err(unexpected("delete_broker", other)),
        }
    }

    /// Merge a change into a registered broker.
    ///
    /// Returns the broker's new epoch, or `None` if the broker is unknown
    /// (in which case nothing is recorded).
    pub async fn register_broker_change(
        &self,
        change: BrokerChange,
    ) -> ClusterResult<Option<BrokerEpoch>> {
        change.validate()?;
        let broker_id = change.broker_id;
        let cmd = BrokerCommand::RegisterChange {
            broker_id,
            host: change.broker_host,
            port: change.broker_port,
            security_protocol: change.security_protocol,
            status: change.broker_status,
        };
        match self.apply(cmd.into()).await? {
            MetadataResponse::Broker(BrokerResponse::ChangeApplied { epoch }) => {
                info!(broker_id = %broker_id, epoch, "Broker change applied");
                Ok(Some(epoch))
            }
            MetadataResponse::Broker(BrokerResponse::NotFound { .. }) => Ok(None),
            MetadataResponse::Broker(BrokerResponse::EpochExhausted { broker_id }) => {
                Err(ClusterError::Validation(format!(
                    "broker {} has reached the maximum epoch",
                    broker_id
                )))
            }
            other => Err(unexpected("register_broker_change", other)),
        }
    }

    /// The broker change log in append order.
    pub async fn get_broker_changes(&self) -> Vec<BrokerChangeRecord> {
        self.read(|s| s.broker_changes.records.clone()).await
    }

    // ========================================================================
    // Topics
    // ========================================================================

    /// Register a topic, returning its UUID (new or existing).
    pub async fn register_topic(&self, registration: TopicRegistration) -> ClusterResult<Uuid> {
        registration.validate()?;
        let name = registration.name;
        let cmd = TopicCommand::Register {
            name: name.clone(),
            topic_uuid: Uuid::new_v4(),
        };
        match self.apply(cmd.into()).await? {
            MetadataResponse::Topic(TopicResponse::Registered {
                topic_uuid,
                created,
            }) => {
                if created {
                    info!(topic = %name, topic_uuid = %topic_uuid, "Topic registered");
                }
                Ok(topic_uuid)
            }
            other => Err(unexpected("register_topic", other)),
        }
    }

    pub async fn get_topic(&self, name: &str) -> Option<TopicRecord> {
        self.read(|s| s.topics.get(name).cloned()).await
    }

    pub async fn get_all_topics(&self) -> Vec<TopicRecord> {
        self.read(|s| s.topics.records.clone()).await
    }

    pub async fn delete_topic(&self, name: &str) -> ClusterResult<Option<TopicRecord>> {
        let cmd = TopicCommand::Delete {
            name: name.to_string(),
        };
        match self.apply(cmd.into()).await? {
            MetadataResponse::Topic(TopicResponse::Deleted(record)) => Ok(Some(record)),
            MetadataResponse::Topic(TopicResponse::NotFound { .. }) => Ok(None),
            other => Err(unexpected("delete_topic", other)),
        }
    }

    // ========================================================================
    // Partitions
    // ========================================================================

    pub async fn register_partition(
        &self,
        registration: PartitionRegistration,
    ) -> ClusterResult<PartitionId> {
        registration.validate()?;
        let cmd = PartitionCommand::Register(registration.into_record());
        match self.apply(cmd.into()).await? {
            MetadataResponse::Partition(PartitionResponse::Registered {
                partition_id,
                created,
            }) => {
                if created {
                    info!(partition_id = %partition_id, "Partition registered");
                }
                Ok(partition_id)
            }
            other => Err(unexpected("register_partition", other)),
        }
    }

    pub async fn get_partition(&self, partition_id: PartitionId) -> Option<PartitionRecord> {
        self.read(|s| s.partitions.get(partition_id).cloned()).await
    }

    pub async fn get_all_partitions(&self) -> Vec<PartitionRecord> {
        self.read(|s| s.partitions.records.clone()).await
    }

    pub async fn delete_partition(
        &self,
        partition_id: PartitionId,
    ) -> ClusterResult<Option<PartitionRecord>> {
        match self
            .apply(PartitionCommand::Delete { partition_id }.into())
            .await?
        {
            MetadataResponse::Partition(PartitionResponse::Deleted(record)) => Ok(Some(record)),
            MetadataResponse::Partition(PartitionResponse::NotFound { .. }) => Ok(None),
            other => Err(unexpected("delete_partition", other)),
        }
    }

    // ========================================================================
    // Producers
    // ========================================================================

    pub async fn register_producer(
        &self,
        registration: ProducerRegistration,
    ) -> ClusterResult<ProducerStatus> {
        registration.validate()?;
        let cmd = ProducerCommand::Register {
            broker_id: registration.broker_id,
            producer_id: registration.producer_id,
        };
        match self.apply(cmd.into()).await? {
            MetadataResponse::Producer(ProducerResponse::Registered { broker_epoch, .. }) => {
                Ok(ProducerStatus::Registered { broker_epoch })
            }
            MetadataResponse::Producer(ProducerResponse::BrokerNotRecognized { broker_id }) => {
                info!(broker_id = %broker_id, "Producer registration for unknown broker rejected");
                Ok(ProducerStatus::BrokerNotRecognized)
            }
            other => Err(unexpected("register_producer", other)),
        }
    }

    pub async fn get_producer(
        &self,
        broker_id: BrokerId,
        producer_id: ProducerId,
    ) -> Option<ProducerIdsRecord> {
        self.read(|s| s.producers.get(broker_id, producer_id).cloned())
            .await
    }

    pub async fn get_all_producers(&self) -> Vec<ProducerIdsRecord> {
        self.read(|s| s.producers.records.clone()).await
    }

    pub async fn delete_producer(
        &self,
        broker_id: BrokerId,
        producer_id: ProducerId,
    ) -> ClusterResult<Option<ProducerIdsRecord>> {
        let cmd = ProducerCommand::Delete {
            broker_id,
            producer_id,
        };
        match self.apply(cmd.into()).await? {
            MetadataResponse::Producer(ProducerResponse::Deleted(record)) => Ok(Some(record)),
            MetadataResponse::Producer(ProducerResponse::NotFound { .. }) => Ok(None),
            other => Err(unexpected("delete_producer", other)),
        }
    }

    // ========================================================================
    // Fetch
    // ========================================================================

    /// Client-facing view: brokers, topics, partitions and broker changes.
    pub async fn metadata_fetch_client(&self) -> ClientMetadata {
        self.read(|s| ClientMetadata {
            brokers: s.brokers.records.clone(),
            topics: s.topics.records.clone(),
            partitions: s.partitions.records.clone(),
            broker_changes: s.broker_changes.records.clone(),
        })
        .await
    }

    /// Broker-facing view: the whole store.
    pub async fn metadata_fetch(&self) -> MetadataStore {
        self.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(id: i32) -> BrokerRegistration {
        BrokerRegistration {
            broker_id: BrokerId(id),
            broker_host: "h".to_string(),
            broker_port: 9092,
            security_protocol: "PLAINTEXT".to_string(),
            rack_id: "r1".to_string(),
        }
    }

    fn partition(id: i32, leader: &str) -> PartitionRegistration {
        PartitionRegistration {
            partition_id: PartitionId(id),
            topic_uuid: Uuid::nil(),
            replicas: vec![NodeId::new("a"), NodeId::new("b")],
            isr: vec![NodeId::new("a"), NodeId::new("b")],
            leader: NodeId::new(leader),
            removing_replicas: Vec::new(),
            adding_replicas: Vec::new(),
            partition_epoch: 0,
        }
    }

    #[tokio::test]
    async fn test_register_broker_twice_returns_same_uuid() {
        let store = MetadataStoreHandle::in_memory();
        let a = store.register_broker(broker(1)).await.unwrap();
        let b = store.register_broker(broker(1)).await.unwrap();
        assert_eq!(a, b);

        let all = store.get_all_brokers().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].epoch, 0);
        assert_eq!(all[0].broker_status, BrokerStatus::Alive);
    }

    #[tokio::test]
    async fn test_invalid_broker_is_rejected_before_store() {
        let store = MetadataStoreHandle::in_memory();
        let mut bad = broker(1);
        bad.broker_port = 0;
        assert!(matches!(
            store.register_broker(bad).await,
            Err(ClusterError::Validation(_))
        ));
        let mut bad = broker(1);
        bad.security_protocol = "TLS".to_string();
        assert!(store.register_broker(bad).await.is_err());
        assert!(store.get_all_brokers().await.is_empty());
    }

    #[tokio::test]
    async fn test_broker_change_epochs() {
        let store = MetadataStoreHandle::in_memory();
        store.register_broker(broker(1)).await.unwrap();

        let epoch = store
            .register_broker_change(BrokerChange::status(BrokerId(1), BrokerStatus::Draining))
            .await
            .unwrap();
        assert_eq!(epoch, Some(1));
        assert_eq!(
            store.get_broker(BrokerId(1)).await.unwrap().broker_status,
            BrokerStatus::Draining
        );

        let missing = store
            .register_broker_change(BrokerChange::status(BrokerId(2), BrokerStatus::Fenced))
            .await
            .unwrap();
        assert_eq!(missing, None);
        assert_eq!(store.get_broker_changes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_topic_lifecycle() {
        let store = MetadataStoreHandle::in_memory();
        let uuid = store
            .register_topic(TopicRegistration::new("orders"))
            .await
            .unwrap();
        assert_eq!(
            store
                .register_topic(TopicRegistration::new("orders"))
                .await
                .unwrap(),
            uuid
        );
        assert_eq!(store.get_topic("orders").await.unwrap().topic_uuid, uuid);
        assert!(store.get_topic("payments").await.is_none());
        assert!(
            store
                .register_topic(TopicRegistration::new("bad topic"))
                .await
                .is_err()
        );

        assert!(store.delete_topic("orders").await.unwrap().is_some());
        assert!(store.delete_topic("orders").await.unwrap().is_none());
        assert!(store.get_all_topics().await.is_empty());
    }

    #[tokio::test]
    async fn test_partition_validation_and_dedupe() {
        let store = MetadataStoreHandle::in_memory();
        assert_eq!(
            store.register_partition(partition(0, "a")).await.unwrap(),
            PartitionId(0)
        );
        assert_eq!(
            store.register_partition(partition(0, "b")).await.unwrap(),
            PartitionId(0)
        );
        assert_eq!(store.get_all_partitions().await.len(), 1);

        let err = store.register_partition(partition(1, "z")).await;
        assert!(matches!(err, Err(ClusterError::Validation(_))));
        assert!(store.get_partition(PartitionId(1)).await.is_none());

        assert!(store.delete_partition(PartitionId(0)).await.unwrap().is_some());
        assert!(store.delete_partition(PartitionId(0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_producer_gating_and_epoch_stamp() {
        let store = MetadataStoreHandle::in_memory();
        let reg = ProducerRegistration {
            broker_id: BrokerId(1),
            producer_id: ProducerId(100),
        };
        assert_eq!(
            store.register_producer(reg).await.unwrap(),
            ProducerStatus::BrokerNotRecognized
        );
        assert!(store.get_all_producers().await.is_empty());

        store.register_broker(broker(1)).await.unwrap();
        store
            .register_broker_change(BrokerChange::status(BrokerId(1), BrokerStatus::Alive))
            .await
            .unwrap();
        assert_eq!(
            store.register_producer(reg).await.unwrap(),
            ProducerStatus::Registered { broker_epoch: 1 }
        );
        assert_eq!(
            store
                .get_producer(BrokerId(1), ProducerId(100))
                .await
                .unwrap()
                .broker_epoch,
            1
        );
        assert!(
            store
                .delete_producer(BrokerId(1), ProducerId(100))
                .await
                .unwrap()
                .is_some()
        );
        assert!(store.get_all_producers().await.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_fetch_views() {
        let store = MetadataStoreHandle::in_memory();
        store.register_broker(broker(1)).await.unwrap();
        store
            .register_topic(TopicRegistration::new("orders"))
            .await
            .unwrap();
        store
            .register_producer(ProducerRegistration {
                broker_id: BrokerId(1),
                producer_id: ProducerId(7),
            })
            .await
            .unwrap();

        let client = store.metadata_fetch_client().await;
        assert_eq!(client.brokers.len(), 1);
        assert_eq!(client.topics.len(), 1);
        assert!(client.partitions.is_empty());

        let full = store.metadata_fetch().await;
        assert_eq!(full.producers.len(), 1);
    }
}
