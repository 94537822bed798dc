//! Partition domain.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Section;
use crate::types::{NodeId, PartitionId};

/// A registered partition and its replica assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionRecord {
    pub partition_id: PartitionId,
    #[serde(rename = "topicUUID")]
    pub topic_uuid: Uuid,
    pub replicas: Vec<NodeId>,
    #[serde(rename = "ISR")]
    pub isr: Vec<NodeId>,
    #[serde(default)]
    pub removing_replicas: Vec<NodeId>,
    #[serde(default)]
    pub adding_replicas: Vec<NodeId>,
    pub leader: NodeId,
    pub partition_epoch: i32,
}

/// Commands for the partition domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionCommand {
    /// Register a partition unless its id is already present.
    Register(PartitionRecord),

    /// Remove a partition.
    Delete { partition_id: PartitionId },
}

/// Responses from partition domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionResponse {
    Registered {
        partition_id: PartitionId,
        created: bool,
    },
    Deleted(PartitionRecord),
    NotFound {
        partition_id: PartitionId,
    },
}

impl Section<PartitionRecord> {
    pub fn get(&self, partition_id: PartitionId) -> Option<&PartitionRecord> {
        self.records.iter().find(|p| p.partition_id == partition_id)
    }

    /// Apply a partition command.
    pub fn apply(&mut self, cmd: PartitionCommand, at: &str) -> PartitionResponse {
        match cmd {
            PartitionCommand::Register(record) => {
                let partition_id = record.partition_id;
                if self.get(partition_id).is_some() {
                    return PartitionResponse::Registered {
                        partition_id,
                        created: false,
                    };
                }
                self.records.push(record);
                self.touch(at);
                PartitionResponse::Registered {
                    partition_id,
                    created: true,
                }
            }

            PartitionCommand::Delete { partition_id } => {
                match self.remove_where(|p| p.partition_id == partition_id) {
                    Some(record) => {
                        self.touch(at);
                        PartitionResponse::Deleted(record)
                    }
                    None => PartitionResponse::NotFound { partition_id },
                }
            }
        }
    }
}
