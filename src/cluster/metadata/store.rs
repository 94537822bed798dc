//! The metadata store and its per-node handle.
//!
//! [`MetadataStore`] is the plain replicated value: five record sections.
//! It is what a heartbeat carries and what a follower installs wholesale.
//!
//! [`MetadataStoreHandle`] is the node-local owner of that value. It keeps
//! the store and the follower's heartbeat clock under one lock, so that
//! installing a snapshot and resetting the clock happen together, and so
//! that a snapshot taken for an outgoing heartbeat always reflects every
//! mutation applied before it.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::broker::{BrokerChangeRecord, BrokerRecord};
use super::commands::{MetadataCommand, MetadataResponse};
use super::partition::PartitionRecord;
use super::producer::ProducerIdsRecord;
use super::topic::TopicRecord;
use super::{Section, format_timestamp};
use crate::cluster::error::ClusterResult;
use crate::cluster::persist::JsonFile;

/// All metadata held by one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStore {
    #[serde(rename = "RegisterBrokerRecords", default)]
    pub brokers: Section<BrokerRecord>,

    #[serde(rename = "TopicRecord", default)]
    pub topics: Section<TopicRecord>,

    #[serde(rename = "PartitionRecords", default)]
    pub partitions: Section<PartitionRecord>,

    #[serde(rename = "ProducerIdsRecords", default)]
    pub producers: Section<ProducerIdsRecord>,

    /// Append-only log of accepted broker changes.
    #[serde(rename = "RegistrationChangeBrokerRecords", default)]
    pub broker_changes: Section<BrokerChangeRecord>,
}

impl MetadataStore {
    /// The empty template every node starts from.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a command, stamping mutated sections with `at`.
    pub fn apply(&mut self, cmd: MetadataCommand, at: DateTime<Utc>) -> MetadataResponse {
        let at = format_timestamp(at);

        match cmd {
            MetadataCommand::Broker(cmd) => MetadataResponse::Broker(
                self.brokers
                    .apply_with_changes(cmd, &mut self.broker_changes, &at),
            ),

            MetadataCommand::Topic(cmd) => MetadataResponse::Topic(self.topics.apply(cmd, &at)),

            MetadataCommand::Partition(cmd) => {
                MetadataResponse::Partition(self.partitions.apply(cmd, &at))
            }

            MetadataCommand::Producer(cmd) => {
                // Producer registration needs the owning broker's epoch
                let brokers = &self.brokers;
                MetadataResponse::Producer(self.producers.apply_with_context(
                    cmd,
                    |broker_id| brokers.epoch_of(broker_id),
                    &at,
                ))
            }
        }
    }

    /// Total number of records across all sections.
    pub fn record_count(&self) -> usize {
        self.brokers.len()
            + self.topics.len()
            + self.partitions.len()
            + self.producers.len()
            + self.broker_changes.len()
    }
}

struct Inner {
    store: MetadataStore,
    /// When this node last installed a heartbeat (or reset the clock).
    last_heartbeat: Instant,
}

/// Node-local owner of the metadata store.
///
/// Every read and write goes through one mutex. When a file is attached,
/// the store is persisted after every change while the lock is still held,
/// so the file never lags behind a later change.
pub struct MetadataStoreHandle {
    inner: Mutex<Inner>,
    file: Option<JsonFile>,
}

impl MetadataStoreHandle {
    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        Self::with_file(None)
    }

    /// A store persisted to `path` after every change.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self::with_file(Some(JsonFile::new(path)))
    }

    fn with_file(file: Option<JsonFile>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store: MetadataStore::new(),
                last_heartbeat: Instant::now(),
            }),
            file,
        }
    }

    /// Write the current (start-up: empty) store to disk.
    pub async fn initialize(&self) -> ClusterResult<()> {
        let inner = self.inner.lock().await;
        self.persist(&inner.store).await
    }

    /// Apply a mutation.
    ///
    /// If persisting fails the error is returned, but the in-memory change
    /// stands and the next successful write catches the file up.
    pub async fn apply(&self, cmd: MetadataCommand) -> ClusterResult<MetadataResponse> {
        let mut inner = self.inner.lock().await;
        let name = cmd.name();
        let response = inner.store.apply(cmd, Utc::now());
        debug!(command = name, response = ?response, "Applied metadata command");
        self.persist(&inner.store).await?;
        Ok(response)
    }

    /// Run a read-only closure against the store.
    pub async fn read<T>(&self, f: impl FnOnce(&MetadataStore) -> T) -> T {
        let inner = self.inner.lock().await;
        f(&inner.store)
    }

    /// Clone of the whole store.
    pub async fn snapshot(&self) -> MetadataStore {
        self.inner.lock().await.store.clone()
    }

    /// Replace the whole store with a leader's snapshot and reset the
    /// heartbeat clock, atomically.
    pub async fn install_snapshot(&self, snapshot: MetadataStore) -> ClusterResult<()> {
        let mut inner = self.inner.lock().await;
        inner.store = snapshot;
        inner.last_heartbeat = Instant::now();
        self.persist(&inner.store).await
    }

    /// Restart the heartbeat clock without touching the store.
    pub async fn reset_heartbeat_clock(&self) {
        self.inner.lock().await.last_heartbeat = Instant::now();
    }

    /// Time since the last installed heartbeat or clock reset.
    pub async fn since_last_heartbeat(&self) -> Duration {
        self.inner.lock().await.last_heartbeat.elapsed()
    }

    async fn persist(&self, store: &MetadataStore) -> ClusterResult<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        if let Err(e) = file.store(store).await {
            warn!(path = %file.path().display(), error = %e, "Failed to persist metadata store");
            return Err(e);
        }
        Ok(())
    }
}
