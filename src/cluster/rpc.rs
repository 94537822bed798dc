//! Node-to-node RPC.
//!
//! Every exchange is one request and one response on a fresh TCP
//! connection. Both are bincode-encoded and framed with a 4-byte big-endian
//! length prefix:
//!
//! ```text
//! ┌──────────────┬─────────────────────────┐
//! │ len: u32 BE  │ bincode payload (len)   │
//! └──────────────┴─────────────────────────┘
//! ```
//!
//! Frames larger than [`MAX_RPC_FRAME_SIZE`] are rejected before the
//! payload is read.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::ClusterError;
use super::handler::ControllerHandler;
use super::metadata::registry::ProducerStatus;
use super::metadata::{
    BrokerChange, BrokerChangeRecord, BrokerRecord, BrokerRegistration, ClientMetadata,
    MetadataStore, PartitionRecord, PartitionRegistration, ProducerIdsRecord,
    ProducerRegistration, TopicRecord, TopicRegistration,
};
use crate::constants::{DEFAULT_RPC_TIMEOUT_MS, MAX_RPC_FRAME_SIZE};
use crate::error::{Error, Result};
use crate::types::{BrokerEpoch, BrokerId, NodeId, PartitionId, ProducerId};

/// A request to a controller node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerRpcMessage {
    // Membership
    RegisterFollower { follower_id: NodeId },
    Heartbeat { leader_id: NodeId, snapshot: MetadataStore },

    // Brokers
    RegisterBroker(BrokerRegistration),
    GetBroker { broker_id: BrokerId },
    GetAllBrokers,
    DeleteBroker { broker_id: BrokerId },
    RegisterBrokerChange(BrokerChange),
    GetBrokerChanges,

    // Topics
    RegisterTopic(TopicRegistration),
    GetTopic { name: String },
    GetAllTopics,
    DeleteTopic { name: String },

    // Partitions
    RegisterPartition(PartitionRegistration),
    GetPartition { partition_id: PartitionId },
    GetAllPartitions,
    DeletePartition { partition_id: PartitionId },

    // Producers
    RegisterProducer(ProducerRegistration),
    GetProducer { broker_id: BrokerId, producer_id: ProducerId },
    GetAllProducers,
    DeleteProducer { broker_id: BrokerId, producer_id: ProducerId },

    // Fetch
    MetadataFetchClient,
    MetadataFetch,
}

impl ControllerRpcMessage {
    /// Short name of the request for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ControllerRpcMessage::RegisterFollower { .. } => "register_follower",
            ControllerRpcMessage::Heartbeat { .. } => "heartbeat",
            ControllerRpcMessage::RegisterBroker(_) => "register_broker",
            ControllerRpcMessage::GetBroker { .. } => "get_broker",
            ControllerRpcMessage::GetAllBrokers => "get_all_brokers",
            ControllerRpcMessage::DeleteBroker { .. } => "delete_broker",
            ControllerRpcMessage::RegisterBrokerChange(_) => "register_broker_change",
            ControllerRpcMessage::GetBrokerChanges => "get_broker_changes",
            ControllerRpcMessage::RegisterTopic(_) => "register_topic",
            ControllerRpcMessage::GetTopic { .. } => "get_topic",
            ControllerRpcMessage::GetAllTopics => "get_all_topics",
            ControllerRpcMessage::DeleteTopic { .. } => "delete_topic",
            ControllerRpcMessage::RegisterPartition(_) => "register_partition",
            ControllerRpcMessage::GetPartition { .. } => "get_partition",
            ControllerRpcMessage::GetAllPartitions => "get_all_partitions",
            ControllerRpcMessage::DeletePartition { .. } => "delete_partition",
            ControllerRpcMessage::RegisterProducer(_) => "register_producer",
            ControllerRpcMessage::GetProducer { .. } => "get_producer",
            ControllerRpcMessage::GetAllProducers => "get_all_producers",
            ControllerRpcMessage::DeleteProducer { .. } => "delete_producer",
            ControllerRpcMessage::MetadataFetchClient => "metadata_fetch_client",
            ControllerRpcMessage::MetadataFetch => "metadata_fetch",
        }
    }
}

/// A controller node's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerRpcResponse {
    /// Membership request accepted.
    Ack,
    /// This node is not the leader; retry against the hint.
    NotLeader { leader_hint: Option<NodeId> },
    /// This node is leading and does not take heartbeats.
    NotFollower,

    BrokerRegistered { internal_uuid: Uuid },
    Broker(BrokerRecord),
    Brokers(Vec<BrokerRecord>),
    BrokerChangeApplied { epoch: BrokerEpoch },
    BrokerChanges(Vec<BrokerChangeRecord>),

    TopicRegistered { topic_uuid: Uuid },
    Topic(TopicRecord),
    Topics(Vec<TopicRecord>),

    PartitionRegistered { partition_id: PartitionId },
    Partition(PartitionRecord),
    Partitions(Vec<PartitionRecord>),

    ProducerRegistered { broker_epoch: BrokerEpoch },
    BrokerNotRecognized,
    Producer(ProducerIdsRecord),
    Producers(Vec<ProducerIdsRecord>),

    ClientMetadata(ClientMetadata),
    Metadata(MetadataStore),

    /// The addressed record does not exist.
    NotFound,
    /// The request failed boundary validation.
    ValidationFailed(String),
    /// Any other failure.
    Error(String),
}

impl From<ClusterError> for ControllerRpcResponse {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::NotLeader { leader_hint } => ControllerRpcResponse::NotLeader { leader_hint },
            ClusterError::NotFollower => ControllerRpcResponse::NotFollower,
            ClusterError::Validation(msg) => ControllerRpcResponse::ValidationFailed(msg),
            other => ControllerRpcResponse::Error(other.to_string()),
        }
    }
}

fn found<T>(value: Option<T>, wrap: impl FnOnce(T) -> ControllerRpcResponse) -> ControllerRpcResponse {
    value.map(wrap).unwrap_or(ControllerRpcResponse::NotFound)
}

fn deleted<T>(
    result: std::result::Result<Option<T>, ClusterError>,
    wrap: impl FnOnce(T) -> ControllerRpcResponse,
) -> ControllerRpcResponse {
    match result {
        Ok(value) => found(value, wrap),
        Err(e) => e.into(),
    }
}

/// Route one request to the handler and build the response.
pub async fn dispatch<H>(handler: &H, message: ControllerRpcMessage) -> ControllerRpcResponse
where
    H: ControllerHandler + ?Sized,
{
    use ControllerRpcMessage as M;
    use ControllerRpcResponse as R;

    match message {
        M::RegisterFollower { follower_id } => {
            match handler.handle_register_follower(follower_id).await {
                Ok(()) => R::Ack,
                Err(e) => e.into(),
            }
        }
        M::Heartbeat {
            leader_id,
            snapshot,
        } => match handler.handle_heartbeat(leader_id, snapshot).await {
            Ok(()) => R::Ack,
            Err(e) => e.into(),
        },

        M::RegisterBroker(registration) => {
            match handler.handle_register_broker(registration).await {
                Ok(internal_uuid) => R::BrokerRegistered { internal_uuid },
                Err(e) => e.into(),
            }
        }
        M::GetBroker { broker_id } => found(handler.handle_get_broker(broker_id).await, R::Broker),
        M::GetAllBrokers => R::Brokers(handler.handle_get_all_brokers().await),
        M::DeleteBroker { broker_id } => {
            deleted(handler.handle_delete_broker(broker_id).await, R::Broker)
        }
        M::RegisterBrokerChange(change) => {
            match handler.handle_register_broker_change(change).await {
                Ok(Some(epoch)) => R::BrokerChangeApplied { epoch },
                Ok(None) => R::NotFound,
                Err(e) => e.into(),
            }
        }
        M::GetBrokerChanges => R::BrokerChanges(handler.handle_get_broker_changes().await),

        M::RegisterTopic(registration) => match handler.handle_register_topic(registration).await {
            Ok(topic_uuid) => R::TopicRegistered { topic_uuid },
            Err(e) => e.into(),
        },
        M::GetTopic { name } => found(handler.handle_get_topic(&name).await, R::Topic),
        M::GetAllTopics => R::Topics(handler.handle_get_all_topics().await),
        M::DeleteTopic { name } => deleted(handler.handle_delete_topic(&name).await, R::Topic),

        M::RegisterPartition(registration) => {
            match handler.handle_register_partition(registration).await {
                Ok(partition_id) => R::PartitionRegistered { partition_id },
                Err(e) => e.into(),
            }
        }
        M::GetPartition { partition_id } => {
            found(handler.handle_get_partition(partition_id).await, R::Partition)
        }
        M::GetAllPartitions => R::Partitions(handler.handle_get_all_partitions().await),
        M::DeletePartition { partition_id } => {
            deleted(handler.handle_delete_partition(partition_id).await, R::Partition)
        }

        M::RegisterProducer(registration) => {
            match handler.handle_register_producer(registration).await {
                Ok(ProducerStatus::Registered { broker_epoch }) => {
                    R::ProducerRegistered { broker_epoch }
                }
                Ok(ProducerStatus::BrokerNotRecognized) => R::BrokerNotRecognized,
                Err(e) => e.into(),
            }
        }
        M::GetProducer {
            broker_id,
            producer_id,
        } => found(
            handler.handle_get_producer(broker_id, producer_id).await,
            R::Producer,
        ),
        M::GetAllProducers => R::Producers(handler.handle_get_all_producers().await),
        M::DeleteProducer {
            broker_id,
            producer_id,
        } => deleted(
            handler.handle_delete_producer(broker_id, producer_id).await,
            R::Producer,
        ),

        M::MetadataFetchClient => R::ClientMetadata(handler.handle_metadata_fetch_client().await),
        M::MetadataFetch => R::Metadata(handler.handle_metadata_fetch().await),
    }
}

// ============================================================================
// Framing
// ============================================================================

/// Encode a value as a bincode payload.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Encode(e.to_string()))
}

/// Decode a bincode payload.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Write one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_RPC_FRAME_SIZE {
        return Err(Error::FrameTooLarge {
            size: payload.len(),
            max: MAX_RPC_FRAME_SIZE,
        });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::MissingData("connection closed before frame header".to_string())
        } else {
            e.into()
        }
    })?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_RPC_FRAME_SIZE {
        return Err(Error::FrameTooLarge {
            size: len,
            max: MAX_RPC_FRAME_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

// ============================================================================
// Server
// ============================================================================

/// Accepts peer connections and dispatches them to a handler.
pub struct RpcServer {
    listener: TcpListener,
    handler: Arc<dyn ControllerHandler>,
    shutdown_tx: watch::Sender<bool>,
    /// How long a connection may take to deliver its request frame.
    request_timeout: Duration,
}

impl RpcServer {
    /// Bind to `addr` (use port 0 for an ephemeral port).
    pub async fn bind(addr: &str, handler: Arc<dyn ControllerHandler>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (shutdown_tx, _) = watch::channel(false);

        info!(addr = %addr, "Controller RPC server listening");

        Ok(Self {
            listener,
            handler,
            shutdown_tx,
            request_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Initiate graceful shutdown. In-flight requests run to completion.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("Controller RPC server shutdown signal sent");
    }

    /// Run the accept loop until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                info!("Controller RPC server shutting down");
                return Ok(());
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let handler = self.handler.clone();
                            let request_timeout = self.request_timeout;
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(handler, stream, request_timeout).await {
                                    warn!(peer = %addr, error = %e, "Error handling controller RPC");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = ?e, "Failed to accept controller RPC connection");
                        }
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    handler: Arc<dyn ControllerHandler>,
    mut stream: TcpStream,
    request_timeout: Duration,
) -> Result<()> {
    let request = tokio::time::timeout(request_timeout, read_frame(&mut stream))
        .await
        .map_err(|_| Error::Timeout(format!("no request within {:?}", request_timeout)))??;
    let response = match decode::<ControllerRpcMessage>(&request) {
        Ok(message) => {
            let name = message.name();
            let response = dispatch(handler.as_ref(), message).await;
            debug!(request = name, "Handled controller RPC");
            response
        }
        Err(e) => ControllerRpcResponse::Error(format!("undecodable request: {}", e)),
    };
    write_frame(&mut stream, &encode(&response)?).await
}
