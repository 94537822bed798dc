//! Producer domain.
//!
//! Producer ids are registered against a broker and stamped with that
//! broker's epoch at registration time, so this domain needs read access
//! to the broker section when it applies a command.

use serde::{Deserialize, Serialize};

use super::Section;
use crate::types::{BrokerEpoch, BrokerId, ProducerId};

/// A registered producer id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerIdsRecord {
    pub broker_id: BrokerId,
    pub broker_epoch: BrokerEpoch,
    pub producer_id: ProducerId,
}

/// Commands for the producer domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProducerCommand {
    Register {
        broker_id: BrokerId,
        producer_id: ProducerId,
    },
    Delete {
        broker_id: BrokerId,
        producer_id: ProducerId,
    },
}

/// Responses from producer domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProducerResponse {
    /// The producer is registered; `created` is false for a duplicate.
    Registered {
        broker_epoch: BrokerEpoch,
        created: bool,
    },

    /// The owning broker is not registered. Nothing was stored.
    BrokerNotRecognized { broker_id: BrokerId },

    Deleted(ProducerIdsRecord),

    NotFound {
        broker_id: BrokerId,
        producer_id: ProducerId,
    },
}

impl Section<ProducerIdsRecord> {
    pub fn get(&self, broker_id: BrokerId, producer_id: ProducerId) -> Option<&ProducerIdsRecord> {
        self.records
            .iter()
            .find(|p| p.broker_id == broker_id && p.producer_id == producer_id)
    }

    /// Apply a producer command.
    ///
    /// `broker_epoch` resolves a broker id to its current epoch, or `None`
    /// if the broker is not registered.
    pub fn apply_with_context<F>(
        &mut self,
        cmd: ProducerCommand,
        broker_epoch: F,
        at: &str,
    ) -> ProducerResponse
    where
        F: Fn(BrokerId) -> Option<BrokerEpoch>,
    {
        match cmd {
            ProducerCommand::Register {
                broker_id,
                producer_id,
            } => {
                let Some(epoch) = broker_epoch(broker_id) else {
                    return ProducerResponse::BrokerNotRecognized { broker_id };
                };

                if let Some(existing) = self.get(broker_id, producer_id) {
                    return ProducerResponse::Registered {
                        broker_epoch: existing.broker_epoch,
                        created: false,
                    };
                }

                self.records.push(ProducerIdsRecord {
                    broker_id,
                    broker_epoch: epoch,
                    producer_id,
                });
                self.touch(at);
                ProducerResponse::Registered {
                    broker_epoch: epoch,
                    created: true,
                }
            }

            ProducerCommand::Delete {
                broker_id,
                producer_id,
            } => match self
                .remove_where(|p| p.broker_id == broker_id && p.producer_id == producer_id)
            {
                Some(record) => {
                    self.touch(at);
                    ProducerResponse::Deleted(record)
                }
                None => ProducerResponse::NotFound {
                    broker_id,
                    producer_id,
                },
            },
        }
    }
}
