//! Controller node example.
//!
//! Runs one controller node: the RPC server plus the role loops. Start
//! several with different addresses and the same `DIRECTORY_PATH` to form a
//! cluster; the first one to start leads.
//!
//! ## Running
//!
//! Single node:
//! ```bash
//! cargo run --example controller
//! ```
//!
//! Three nodes (in separate terminals):
//! ```bash
//! LISTEN_ADDR=127.0.0.1:7001 DIRECTORY_PATH=/tmp/kc/cluster.json cargo run --example controller
//! LISTEN_ADDR=127.0.0.1:7002 DIRECTORY_PATH=/tmp/kc/cluster.json cargo run --example controller
//! LISTEN_ADDR=127.0.0.1:7003 DIRECTORY_PATH=/tmp/kc/cluster.json cargo run --example controller
//! ```
//!
//! Stop the leader with Ctrl-C and watch a follower take over within the
//! heartbeat timeout plus election backoff.
//!
//! With JSON logging and fast failover:
//! ```bash
//! LOG_FORMAT=json CLUSTER_PROFILE=low-latency cargo run --example controller
//! ```

use std::sync::Arc;

use kafkaesque_controller::cluster::{ControllerConfig, ControllerNode, RpcServer};
use kafkaesque_controller::telemetry::{LoggingConfig, node_span};
use tracing::{Instrument, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    LoggingConfig::from_env()
        .init()
        .map_err(|e| -> Box<dyn std::error::Error> { e })?;

    let config = ControllerConfig::from_env()?;
    info!(
        node_id = %config.node_id,
        listen_addr = %config.listen_addr,
        data_path = %config.data_path.display(),
        directory = %config.directory_path.display(),
        heartbeat_ms = config.heartbeat_interval.as_millis() as u64,
        timeout_ms = config.heartbeat_timeout.as_millis() as u64,
        "Starting controller node"
    );

    let node = ControllerNode::from_config(config.clone());

    // Serve before resolving the role so followers can register right away.
    let server = Arc::new(
        RpcServer::bind(&config.listen_addr, node.clone())
            .await?
            .with_request_timeout(config.rpc_timeout),
    );
    let server_task = {
        let server = server.clone();
        tokio::spawn(
            async move {
                if let Err(e) = server.run().await {
                    tracing::error!(error = %e, "Controller RPC server error");
                }
            }
            .instrument(node_span(node.node_id())),
        )
    };

    node.start().instrument(node_span(node.node_id())).await?;
    if let Some(role) = node.role().await {
        info!(node_id = %node.node_id(), role = %role, "Controller node is running");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    node.shutdown().await;
    server.shutdown();
    let _ = server_task.await;
    Ok(())
}
