//! Error types for the cluster controller.
//!
//! # Error Handling Patterns
//!
//! ## Fail-Fast (Propagate Errors)
//!
//! Used where failure means the node cannot behave correctly:
//! - Reading the cluster directory at start-up (corrupt or unreadable file)
//! - Invalid configuration
//! - Registration input that fails validation
//!
//! ## Best-Effort (Log and Continue)
//!
//! Used where the next tick naturally retries:
//! - Heartbeat sends to individual followers
//! - Follower registration with the leader
//! - Journal persistence
//!
//! ## Not-Found Is Not An Error
//!
//! Lookups, deletes and broker changes against missing records answer with
//! structured `NotFound` response variants instead of an error, and
//! duplicate registrations answer with the existing identity.

use thiserror::Error;

use crate::types::NodeId;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur in the cluster controller.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The cluster directory has never been written.
    #[error("Cluster directory not found")]
    DirectoryNotFound,

    /// Configuration error (including an unreadable or corrupt directory).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Registration input rejected at the boundary.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A peer could not be reached or did not answer.
    #[error("Peer {peer} unreachable: {message}")]
    PeerUnreachable { peer: NodeId, message: String },

    /// The request needs the leader and this node is not it.
    #[error("Not the leader (leader hint: {leader_hint:?})")]
    NotLeader { leader_hint: Option<NodeId> },

    /// A heartbeat reached a node that is not following anyone.
    #[error("Not a follower")]
    NotFollower,

    /// The peer answered with something other than what was asked for.
    #[error("Unexpected response from {peer}: {message}")]
    UnexpectedResponse { peer: NodeId, message: String },

    /// Generic persistence error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The node is shutting down.
    #[error("Node is shutting down")]
    Shutdown,

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// Whether this error is a peer-level failure the next tick retries.
    #[inline]
    pub fn is_peer_failure(&self) -> bool {
        matches!(
            self,
            ClusterError::PeerUnreachable { .. } | ClusterError::UnexpectedResponse { .. }
        )
    }

    /// Whether this error must stop the node from starting.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClusterError::Config(_) | ClusterError::Serde(_) | ClusterError::Io(_)
        )
    }

    /// Build a [`ClusterError::PeerUnreachable`] from any displayable cause.
    pub fn unreachable(peer: &NodeId, cause: impl std::fmt::Display) -> Self {
        ClusterError::PeerUnreachable {
            peer: peer.clone(),
            message: cause.to_string(),
        }
    }
}
