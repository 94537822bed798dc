//! Broker domain: registration, lifecycle changes and the change log.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Section;
use crate::types::{BrokerEpoch, BrokerId};

/// Lifecycle status of a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerStatus {
    Alive,
    Draining,
    Fenced,
    ShuttingDown,
    Offline,
}

impl std::fmt::Display for BrokerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerStatus::Alive => write!(f, "ALIVE"),
            BrokerStatus::Draining => write!(f, "DRAINING"),
            BrokerStatus::Fenced => write!(f, "FENCED"),
            BrokerStatus::ShuttingDown => write!(f, "SHUTTING_DOWN"),
            BrokerStatus::Offline => write!(f, "OFFLINE"),
        }
    }
}

impl std::str::FromStr for BrokerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALIVE" => Ok(BrokerStatus::Alive),
            "DRAINING" => Ok(BrokerStatus::Draining),
            "FENCED" => Ok(BrokerStatus::Fenced),
            "SHUTTING_DOWN" => Ok(BrokerStatus::ShuttingDown),
            "OFFLINE" => Ok(BrokerStatus::Offline),
            _ => Err(format!(
                "Unknown broker status '{}'. Valid statuses: ALIVE, DRAINING, FENCED, SHUTTING_DOWN, OFFLINE",
                s
            )),
        }
    }
}

/// A registered broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerRecord {
    #[serde(rename = "internalUUID")]
    pub internal_uuid: Uuid,
    pub broker_id: BrokerId,
    pub broker_host: String,
    pub broker_port: i32,
    pub security_protocol: String,
    pub rack_id: String,
    pub broker_status: BrokerStatus,
    /// Bumped by exactly one per accepted change.
    pub epoch: BrokerEpoch,
}

/// One accepted broker change. Fields the change did not touch are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerChangeRecord {
    pub broker_id: BrokerId,
    #[serde(default)]
    pub broker_host: Option<String>,
    #[serde(default)]
    pub broker_port: Option<i32>,
    #[serde(default)]
    pub security_protocol: Option<String>,
    #[serde(default)]
    pub broker_status: Option<BrokerStatus>,
    /// Broker epoch after this change.
    pub epoch: BrokerEpoch,
    pub timestamp: String,
}

/// Commands for the broker domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerCommand {
    /// Register a broker. `internal_uuid` is only used if the broker is new.
    Register {
        internal_uuid: Uuid,
        broker_id: BrokerId,
        host: String,
        port: i32,
        security_protocol: String,
        rack_id: String,
    },

    /// Merge a change into an existing broker and bump its epoch.
    RegisterChange {
        broker_id: BrokerId,
        host: Option<String>,
        port: Option<i32>,
        security_protocol: Option<String>,
        status: Option<BrokerStatus>,
    },

    /// Remove a broker.
    Delete { broker_id: BrokerId },
}

/// Responses from broker domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerResponse {
    /// The broker is registered; `created` is false for a duplicate.
    Registered { internal_uuid: Uuid, created: bool },

    /// The change was merged; `epoch` is the new broker epoch.
    ChangeApplied { epoch: BrokerEpoch },

    /// The broker was removed.
    Deleted(BrokerRecord),

    /// No broker with this id.
    NotFound { broker_id: BrokerId },

    /// The broker's epoch cannot be bumped again; nothing was changed.
    EpochExhausted { broker_id: BrokerId },
}

impl Section<BrokerRecord> {
    /// Look up a broker by id.
    pub fn get(&self, broker_id: BrokerId) -> Option<&BrokerRecord> {
        self.records.iter().find(|b| b.broker_id == broker_id)
    }

    /// Current epoch of a broker, if registered.
    pub fn epoch_of(&self, broker_id: BrokerId) -> Option<BrokerEpoch> {
        self.get(broker_id).map(|b| b.epoch)
    }

    /// Apply a broker command.
    ///
    /// Accepted changes are appended to `changes`. Both sections are stamped
    /// with `at` only when they are mutated.
    pub fn apply_with_changes(
        &mut self,
        cmd: BrokerCommand,
        changes: &mut Section<BrokerChangeRecord>,
        at: &str,
    ) -> BrokerResponse {
        match cmd {
            BrokerCommand::Register {
                internal_uuid,
                broker_id,
                host,
                port,
                security_protocol,
                rack_id,
            } => {
                if let Some(existing) = self.get(broker_id) {
                    return BrokerResponse::Registered {
                        internal_uuid: existing.internal_uuid,
                        created: false,
                    };
                }

                self.records.push(BrokerRecord {
                    internal_uuid,
                    broker_id,
                    broker_host: host,
                    broker_port: port,
                    security_protocol,
                    rack_id,
                    broker_status: BrokerStatus::Alive,
                    epoch: 0,
                });
                self.touch(at);
                BrokerResponse::Registered {
                    internal_uuid,
                    created: true,
                }
            }

            BrokerCommand::RegisterChange {
                broker_id,
                host,
                port,
                security_protocol,
                status,
            } => {
                let Some(broker) = self.records.iter_mut().find(|b| b.broker_id == broker_id)
                else {
                    return BrokerResponse::NotFound { broker_id };
                };
                let Some(epoch) = broker.epoch.checked_add(1) else {
                    return BrokerResponse::EpochExhausted { broker_id };
                };

                if let Some(host) = &host {
                    broker.broker_host = host.clone();
                }
                if let Some(port) = port {
                    broker.broker_port = port;
                }
                if let Some(protocol) = &security_protocol {
                    broker.security_protocol = protocol.clone();
                }
                if let Some(status) = status {
                    broker.broker_status = status;
                }
                broker.epoch = epoch;
                self.touch(at);

                changes.records.push(BrokerChangeRecord {
                    broker_id,
                    broker_host: host,
                    broker_port: port,
                    security_protocol,
                    broker_status: status,
                    epoch,
                    timestamp: at.to_string(),
                });
                changes.touch(at);

                BrokerResponse::ChangeApplied { epoch }
            }

            BrokerCommand::Delete { broker_id } => {
                match self.remove_where(|b| b.broker_id == broker_id) {
                    Some(record) => {
                        self.touch(at);
                        BrokerResponse::Deleted(record)
                    }
                    None => BrokerResponse::NotFound { broker_id },
                }
            }
        }
    }
}
