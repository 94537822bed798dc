//! Metadata commands and responses.
//!
//! Commands are the mutations a node applies to its own metadata store.
//! Responses are the outcome of applying one command.

use serde::{Deserialize, Serialize};

use super::broker::{BrokerCommand, BrokerResponse};
use super::partition::{PartitionCommand, PartitionResponse};
use super::producer::{ProducerCommand, ProducerResponse};
use super::topic::{TopicCommand, TopicResponse};

/// A mutation of the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataCommand {
    /// Broker registration, change or removal.
    Broker(BrokerCommand),

    /// Topic registration or removal.
    Topic(TopicCommand),

    /// Partition registration or removal.
    Partition(PartitionCommand),

    /// Producer registration or removal.
    Producer(ProducerCommand),
}

/// Outcome of applying a [`MetadataCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataResponse {
    Broker(BrokerResponse),
    Topic(TopicResponse),
    Partition(PartitionResponse),
    Producer(ProducerResponse),
}

impl From<BrokerCommand> for MetadataCommand {
    fn from(cmd: BrokerCommand) -> Self {
        MetadataCommand::Broker(cmd)
    }
}

impl From<TopicCommand> for MetadataCommand {
    fn from(cmd: TopicCommand) -> Self {
        MetadataCommand::Topic(cmd)
    }
}

impl From<PartitionCommand> for MetadataCommand {
    fn from(cmd: PartitionCommand) -> Self {
        MetadataCommand::Partition(cmd)
    }
}

impl From<ProducerCommand> for MetadataCommand {
    fn from(cmd: ProducerCommand) -> Self {
        MetadataCommand::Producer(cmd)
    }
}

impl MetadataCommand {
    /// Short name of the command for logging.
    pub fn name(&self) -> &'static str {
        match self {
            MetadataCommand::Broker(BrokerCommand::Register { .. }) => "register_broker",
            MetadataCommand::Broker(BrokerCommand::RegisterChange { .. }) => {
                "register_broker_change"
            }
            MetadataCommand::Broker(BrokerCommand::Delete { .. }) => "delete_broker",
            MetadataCommand::Topic(TopicCommand::Register { .. }) => "register_topic",
            MetadataCommand::Topic(TopicCommand::Delete { .. }) => "delete_topic",
            MetadataCommand::Partition(PartitionCommand::Register(_)) => "register_partition",
            MetadataCommand::Partition(PartitionCommand::Delete { .. }) => "delete_partition",
            MetadataCommand::Producer(ProducerCommand::Register { .. }) => "register_producer",
            MetadataCommand::Producer(ProducerCommand::Delete { .. }) => "delete_producer",
        }
    }
}
