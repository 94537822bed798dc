//! Cluster directory: the shared record of who leads and who follows.
//!
//! The directory is the single source of truth for topology:
//!
//! ```text
//! { "leaderId": "127.0.0.1:7001",
//!   "followerIds": ["127.0.0.1:7002", "127.0.0.1:7003"],
//!   "electionInProgress": false }
//! ```
//!
//! Writes replace the whole value. There is no optimistic-concurrency token,
//! so two nodes racing through an election can interleave and the last
//! writer wins. Within one process the stores serialize writers with a
//! mutex; safety across processes relies on each node process being the only
//! writer during its own transitions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::{ClusterError, ClusterResult};
use super::persist::JsonFile;
use crate::types::NodeId;

/// Shared cluster topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDirectory {
    /// Current leader, if any.
    #[serde(default)]
    pub leader_id: Option<NodeId>,
    /// Registered followers. Unique; never contains the leader.
    #[serde(default)]
    pub follower_ids: Vec<NodeId>,
    /// Set by a follower that has declared the leader dead.
    #[serde(default)]
    pub election_in_progress: bool,
}

impl ClusterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `node_id` is the recorded leader.
    pub fn is_leader(&self, node_id: &NodeId) -> bool {
        self.leader_id.as_ref() == Some(node_id)
    }

    /// Whether `node_id` is a registered follower.
    pub fn is_follower(&self, node_id: &NodeId) -> bool {
        self.follower_ids.contains(node_id)
    }

    /// Add a follower. Returns false if it was already present or is the leader.
    pub fn add_follower(&mut self, node_id: NodeId) -> bool {
        if self.is_leader(&node_id) || self.is_follower(&node_id) {
            return false;
        }
        self.follower_ids.push(node_id);
        true
    }

    /// Remove a follower. Returns true if it was present.
    pub fn remove_follower(&mut self, node_id: &NodeId) -> bool {
        let before = self.follower_ids.len();
        self.follower_ids.retain(|id| id != node_id);
        self.follower_ids.len() != before
    }

    /// Record `node_id` as leader and close any open election.
    pub fn claim_leadership(&mut self, node_id: NodeId) {
        self.remove_follower(&node_id);
        self.leader_id = Some(node_id);
        self.election_in_progress = false;
    }

    /// Restore the invariants on a value read from outside.
    ///
    /// Drops duplicate followers and removes the leader from the follower
    /// list. Returns true if anything changed.
    pub fn normalize(&mut self) -> bool {
        let before = self.follower_ids.clone();
        let mut seen = Vec::with_capacity(self.follower_ids.len());
        for id in self.follower_ids.drain(..) {
            if !seen.contains(&id) && self.leader_id.as_ref() != Some(&id) {
                seen.push(id);
            }
        }
        self.follower_ids = seen;
        self.follower_ids != before
    }
}

/// Read/write access to the persisted directory.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Read the directory.
    ///
    /// Fails with [`ClusterError::DirectoryNotFound`] if it was never
    /// written; with [`ClusterError::Config`] if it exists but cannot be read.
    async fn read(&self) -> ClusterResult<ClusterDirectory>;

    /// Atomically replace the directory.
    async fn write(&self, directory: &ClusterDirectory) -> ClusterResult<()>;
}

/// Read the directory, creating an empty one if it does not exist yet.
pub async fn read_or_init(store: &dyn DirectoryStore) -> ClusterResult<ClusterDirectory> {
    match store.read().await {
        Ok(directory) => Ok(directory),
        Err(ClusterError::DirectoryNotFound) => {
            let directory = ClusterDirectory::new();
            store.write(&directory).await?;
            info!("Created empty cluster directory");
            Ok(directory)
        }
        Err(e) => Err(e),
    }
}

/// Directory persisted as a JSON file shared by every node on the host.
pub struct FileDirectoryStore {
    file: JsonFile,
    write_lock: Mutex<()>,
}

impl FileDirectoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[async_trait]
impl DirectoryStore for FileDirectoryStore {
    async fn read(&self) -> ClusterResult<ClusterDirectory> {
        match self.file.load::<ClusterDirectory>().await {
            Ok(Some(mut directory)) => {
                directory.normalize();
                Ok(directory)
            }
            Ok(None) => Err(ClusterError::DirectoryNotFound),
            Err(e) => Err(ClusterError::Config(format!(
                "cluster directory at {} is unreadable: {}",
                self.file.path().display(),
                e
            ))),
        }
    }

    async fn write(&self, directory: &ClusterDirectory) -> ClusterResult<()> {
        let _guard = self.write_lock.lock().await;
        self.file.store(directory).await?;
        debug!(
            leader = ?directory.leader_id,
            followers = directory.follower_ids.len(),
            election_in_progress = directory.election_in_progress,
            "Cluster directory written"
        );
        Ok(())
    }
}

/// In-process directory shared by cloning.
///
/// Used when several nodes run in one process (tests, demos).
#[derive(Clone, Default)]
pub struct MemoryDirectoryStore {
    inner: Arc<Mutex<Option<ClusterDirectory>>>,
}

impl MemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `directory`.
    pub fn with_directory(directory: ClusterDirectory) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(directory))),
        }
    }

    /// Current value without going through the trait.
    pub async fn snapshot(&self) -> Option<ClusterDirectory> {
        self.inner.lock().await.clone()
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectoryStore {
    async fn read(&self) -> ClusterResult<ClusterDirectory> {
        self.inner
            .lock()
            .await
            .clone()
            .ok_or(ClusterError::DirectoryNotFound)
    }

    async fn write(&self, directory: &ClusterDirectory) -> ClusterResult<()> {
        *self.inner.lock().await = Some(directory.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn node(id: &str) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn test_add_follower_is_idempotent() {
        let mut dir = ClusterDirectory::new();
        assert!(dir.add_follower(node("b")));
        assert!(!dir.add_follower(node("b")));
        assert_eq!(dir.follower_ids, vec![node("b")]);
    }

    #[test]
    fn test_leader_cannot_be_follower() {
        let mut dir = ClusterDirectory::new();
        dir.claim_leadership(node("a"));
        assert!(!dir.add_follower(node("a")));
        assert!(dir.follower_ids.is_empty());
    }

    #[test]
    fn test_claim_leadership_removes_self_and_closes_election() {
        let mut dir = ClusterDirectory {
            leader_id: Some(node("a")),
            follower_ids: vec![node("b"), node("c")],
            election_in_progress: true,
        };
        dir.claim_leadership(node("b"));
        assert!(dir.is_leader(&node("b")));
        assert!(!dir.is_follower(&node("b")));
        assert!(dir.is_follower(&node("c")));
        assert!(!dir.election_in_progress);
    }

    #[test]
    fn test_normalize_dedupes_and_drops_leader() {
        let mut dir = ClusterDirectory {
            leader_id: Some(node("a")),
            follower_ids: vec![node("b"), node("a"), node("b"), node("c")],
            election_in_progress: false,
        };
        assert!(dir.normalize());
        assert_eq!(dir.follower_ids, vec![node("b"), node("c")]);
        assert!(!dir.normalize());
    }

    #[test]
    fn test_serialized_field_names() {
        let dir = ClusterDirectory {
            leader_id: Some(node("127.0.0.1:7001")),
            follower_ids: vec![node("127.0.0.1:7002")],
            election_in_progress: false,
        };
        let json = serde_json::to_value(&dir).unwrap();
        assert_eq!(json["leaderId"], "127.0.0.1:7001");
        assert_eq!(json["followerIds"][0], "127.0.0.1:7002");
        assert_eq!(json["electionInProgress"], false);
    }

    #[tokio::test]
    async fn test_memory_store_not_found_then_init() {
        let store = MemoryDirectoryStore::new();
        assert!(matches!(
            store.read().await,
            Err(ClusterError::DirectoryNotFound)
        ));
        let dir = read_or_init(&store).await.unwrap();
        assert_eq!(dir, ClusterDirectory::default());
        assert_eq!(store.snapshot().await, Some(ClusterDirectory::default()));
    }

    #[tokio::test]
    async fn test_memory_store_is_shared_across_clones() {
        let store = MemoryDirectoryStore::new();
        let other = store.clone();
        let mut dir = ClusterDirectory::new();
        dir.claim_leadership(node("a"));
        store.write(&dir).await.unwrap();
        assert!(other.read().await.unwrap().is_leader(&node("a")));
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = FileDirectoryStore::new(tmp.path().join("cluster.json"));
        assert!(matches!(
            store.read().await,
            Err(ClusterError::DirectoryNotFound)
        ));

        let mut dir = ClusterDirectory::new();
        dir.claim_leadership(node("a"));
        dir.add_follower(node("b"));
        store.write(&dir).await.unwrap();

        let reopened = FileDirectoryStore::new(tmp.path().join("cluster.json"));
        assert_eq!(reopened.read().await.unwrap(), dir);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cluster.json");
        std::fs::write(&path, b"[1, 2").unwrap();
        let store = FileDirectoryStore::new(path);
        let err = store.read().await.unwrap_err();
        assert!(matches!(err, ClusterError::Config(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_file_store_accepts_missing_optional_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cluster.json");
        std::fs::write(&path, br#"{"leaderId": "127.0.0.1:7001"}"#).unwrap();
        let store = FileDirectoryStore::new(path);
        let dir = store.read().await.unwrap();
        assert!(dir.is_leader(&node("127.0.0.1:7001")));
        assert!(dir.follower_ids.is_empty());
        assert!(!dir.election_in_progress);
    }
}
