//! Outbound side of node-to-node RPC.
//!
//! [`PeerTransport`] is what role loops use to reach other nodes. Two
//! implementations:
//!
//! - [`TcpTransport`]: one TCP connection per request, bounded by a connect
//!   timeout and an operation timeout
//! - [`InMemoryTransport`]: routes requests to handlers in the same process,
//!   still through the bincode encoding, and can simulate unreachable nodes

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::config::ControllerConfig;
use super::error::{ClusterError, ClusterResult};
use super::handler::ControllerHandler;
use super::metadata::MetadataStore;
use super::rpc::{
    ControllerRpcMessage, ControllerRpcResponse, decode, dispatch, encode, read_frame, write_frame,
};
use crate::constants::{DEFAULT_RPC_TIMEOUT_MS, RPC_CONNECT_TIMEOUT_MS};
use crate::types::NodeId;

/// Sends requests to other controller nodes.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Send one request and wait for the response.
    ///
    /// Fails with `PeerUnreachable` if the peer cannot be reached or does
    /// not answer in time.
    async fn send(
        &self,
        peer: &NodeId,
        message: ControllerRpcMessage,
    ) -> ClusterResult<ControllerRpcResponse>;

    /// Ask `leader` to add `follower_id` to the cluster.
    async fn register_follower(&self, leader: &NodeId, follower_id: &NodeId) -> ClusterResult<()> {
        let message = ControllerRpcMessage::RegisterFollower {
            follower_id: follower_id.clone(),
        };
        expect_ack(leader, self.send(leader, message).await?)
    }

    /// Push a heartbeat carrying the full store to `follower`.
    async fn send_heartbeat(
        &self,
        follower: &NodeId,
        leader_id: &NodeId,
        snapshot: MetadataStore,
    ) -> ClusterResult<()> {
        let message = ControllerRpcMessage::Heartbeat {
            leader_id: leader_id.clone(),
            snapshot,
        };
        expect_ack(follower, self.send(follower, message).await?)
    }
}

fn expect_ack(peer: &NodeId, response: ControllerRpcResponse) -> ClusterResult<()> {
    match response {
        ControllerRpcResponse::Ack => Ok(()),
        ControllerRpcResponse::NotLeader { leader_hint } => Err(ClusterError::NotLeader { leader_hint }),
        ControllerRpcResponse::NotFollower => Err(ClusterError::NotFollower),
        ControllerRpcResponse::Error(message) => Err(ClusterError::UnexpectedResponse {
            peer: peer.clone(),
            message,
        }),
        other => Err(ClusterError::UnexpectedResponse {
            peer: peer.clone(),
            message: format!("expected Ack, got {:?}", other),
        }),
    }
}

// ============================================================================
// TCP
// ============================================================================

/// Transport over TCP. Node ids are dialed as socket addresses.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
    rpc_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RPC_CONNECT_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
        )
    }
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, rpc_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            rpc_timeout,
        }
    }

    /// Transport using the node's configured RPC timeout.
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            Duration::from_millis(RPC_CONNECT_TIMEOUT_MS).min(config.rpc_timeout),
            config.rpc_timeout,
        )
    }

    async fn exchange(stream: &mut TcpStream, data: &[u8]) -> crate::error::Result<ControllerRpcResponse> {
        write_frame(stream, data).await?;
        let response = read_frame(stream).await?;
        decode(&response)
    }
}

#[async_trait]
impl PeerTransport for TcpTransport {
    async fn send(
        &self,
        peer: &NodeId,
        message: ControllerRpcMessage,
    ) -> ClusterResult<ControllerRpcResponse> {
        let data = encode(&message).map_err(|e| ClusterError::unreachable(peer, e))?;

        let mut stream = timeout(self.connect_timeout, TcpStream::connect(peer.as_str()))
            .await
            .map_err(|_| ClusterError::unreachable(peer, "connect timeout"))?
            .map_err(|e| ClusterError::unreachable(peer, e))?;

        let response = timeout(self.rpc_timeout, Self::exchange(&mut stream, &data))
            .await
            .map_err(|_| ClusterError::unreachable(peer, "operation timeout"))?
            .map_err(|e| ClusterError::unreachable(peer, e))?;

        debug!(peer = %peer, request = message.name(), "Controller RPC complete");
        Ok(response)
    }
}

// ============================================================================
// In-process
// ============================================================================

/// Transport between nodes living in one process.
///
/// Handlers are held weakly so a node can be dropped while still
/// registered; a dropped node is unreachable.
#[derive(Default)]
pub struct InMemoryTransport {
    nodes: DashMap<NodeId, Weak<dyn ControllerHandler>>,
    unreachable: DashSet<NodeId>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handler` reachable as `node_id`.
    pub fn register<H>(&self, node_id: NodeId, handler: &Arc<H>)
    where
        H: ControllerHandler + 'static,
    {
        let weak: Weak<dyn ControllerHandler> = Arc::downgrade(handler) as Weak<dyn ControllerHandler>;
        self.nodes.insert(node_id, weak);
    }

    /// Remove a node entirely.
    pub fn deregister(&self, node_id: &NodeId) {
        self.nodes.remove(node_id);
    }

    /// Simulate a crash or partition (`false`) or recovery (`true`).
    pub fn set_reachable(&self, node_id: &NodeId, reachable: bool) {
        if reachable {
            self.unreachable.remove(node_id);
        } else {
            self.unreachable.insert(node_id.clone());
        }
    }

    pub fn is_reachable(&self, node_id: &NodeId) -> bool {
        !self.unreachable.contains(node_id)
            && self
                .nodes
                .get(node_id)
                .is_some_and(|entry| entry.strong_count() > 0)
    }
}

#[async_trait]
impl PeerTransport for InMemoryTransport {
    async fn send(
        &self,
        peer: &NodeId,
        message: ControllerRpcMessage,
    ) -> ClusterResult<ControllerRpcResponse> {
        if self.unreachable.contains(peer) {
            return Err(ClusterError::unreachable(peer, "node is unreachable"));
        }
        let handler = self
            .nodes
            .get(peer)
            .and_then(|entry| entry.upgrade())
            .ok_or_else(|| ClusterError::unreachable(peer, "no such node"))?;

        // Same encoding as the wire so serde behaviour matches TCP.
        let bytes = encode(&message).map_err(|e| ClusterError::unreachable(peer, e))?;
        let message: ControllerRpcMessage =
            decode(&bytes).map_err(|e| ClusterError::unreachable(peer, e))?;

        Ok(dispatch(handler.as_ref(), message).await)
    }
}
