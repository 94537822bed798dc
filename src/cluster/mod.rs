//! Cluster controller: leader election, heartbeat replication and the
//! metadata registration surface.
//!
//! Every node keeps a full copy of the cluster metadata. One node leads and
//! pushes its whole store to every follower on each heartbeat tick; the
//! followers overwrite their copy. Who leads is recorded in a shared
//! cluster directory.
//!
//! # Architecture
//!
//! ```text
//!              ┌────────────────────────┐
//!              │   Cluster directory    │  leaderId, followerIds,
//!              │     (cluster.json)     │  electionInProgress
//!              └───────────┬────────────┘
//!          read / write    │
//!        ┌─────────────────┼─────────────────┐
//!        ▼                 ▼                 ▼
//!   ┌─────────┐       ┌─────────┐       ┌─────────┐
//!   │ Node A  │──────▶│ Node B  │       │ Node C  │
//!   │ Leader  │  HB   │Follower │       │Follower │
//!   └────┬────┘       └─────────┘       └─────────┘
//!        │                 HB                ▲
//!        └───────────────────────────────────┘
//!
//!   HB = heartbeat carrying the full MetadataStore
//! ```
//!
//! A follower that stops hearing from its leader marks an election in the
//! directory, sleeps a random backoff and takes over if nobody else did.
//! There is no vote: the last writer of the directory wins and everyone
//! else follows it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kafkaesque_controller::cluster::{ControllerConfig, ControllerNode, RpcServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ControllerConfig::from_env()?;
//!     let node = ControllerNode::from_config(config.clone());
//!     node.start().await?;
//!
//!     let server = RpcServer::bind(&config.listen_addr, node.clone()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

mod config;
pub mod directory;
mod error;
pub mod failure_detector;
mod handler;
pub mod metadata;
mod node;
mod persist;
pub mod role;
pub mod rpc;
pub mod tasks;
pub mod transport;
pub mod validation;

pub use config::{ClusterProfile, ControllerConfig};
pub use directory::{ClusterDirectory, DirectoryStore, FileDirectoryStore, MemoryDirectoryStore};
pub use error::{ClusterError, ClusterResult};
pub use failure_detector::{HeartbeatMonitorConfig, LeaderHealthState, LeaderMonitor};
pub use handler::ControllerHandler;
pub use metadata::{
    BrokerChange, BrokerRegistration, ClientMetadata, EventJournal, JournalAction, MetadataStore,
    MetadataStoreHandle, PartitionRegistration, ProducerRegistration, ProducerStatus,
    TopicRegistration,
};
pub use node::ControllerNode;
pub use role::{NodeRole, RoleEvent};
pub use rpc::{ControllerRpcMessage, ControllerRpcResponse, RpcServer};
pub use tasks::{RoleTaskRegistry, StopReport};
pub use transport::{InMemoryTransport, PeerTransport, TcpTransport};
