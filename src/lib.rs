//! # Kafkaesque Controller
//! Metadata controller for a Kafka-style broker cluster.
//!
//! A small cluster of controller nodes keeps the registry of brokers,
//! topics, partitions and producer ids. One node leads and replicates its
//! whole store to the others with periodic heartbeats; when it goes quiet,
//! a follower takes over through a randomized-backoff election recorded in
//! a shared cluster directory.
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use kafkaesque_controller::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let config = ControllerConfig::from_env()?;
//!     let node = ControllerNode::from_config(config.clone());
//!     node.start().await?;
//!
//!     node.handle_register_topic(TopicRegistration::new("orders")).await?;
//!
//!     let server = RpcServer::bind(&config.listen_addr, node.clone()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! See `demos/controller.rs` for a runnable node.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod constants;
pub mod error;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Main exports for running and talking to a controller node.
    pub use crate::cluster::{
        BrokerChange, BrokerRegistration, ClusterError, ClusterProfile, ClusterResult,
        ControllerConfig, ControllerHandler, ControllerNode, NodeRole, PartitionRegistration,
        ProducerRegistration, ProducerStatus, RpcServer, TopicRegistration,
    };
    pub use crate::error::{Error, Result};
    pub use crate::types::{BrokerEpoch, BrokerId, NodeId, PartitionId, ProducerId};
}
