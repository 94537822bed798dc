//! Append-only journal of heartbeat traffic.
//!
//! Purely diagnostic: control logic never reads it back.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use super::format_timestamp;
use crate::cluster::error::ClusterResult;
use crate::constants::JOURNAL_RETAINED_ENTRIES;
use crate::types::NodeId;

/// Direction of a journaled heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalAction {
    Sent,
    Received,
}

impl fmt::Display for JournalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalAction::Sent => write!(f, "sent"),
            JournalAction::Received => write!(f, "received"),
        }
    }
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: String,
    pub action: JournalAction,
    /// Follower the heartbeat went to, or leader it came from.
    pub peer: NodeId,
}

struct JournalState {
    /// Most recent entries, oldest first.
    recent: VecDeque<JournalEntry>,
    file: Option<File>,
}

/// Per-node event journal.
///
/// Persistent journals append one JSON line per entry. Memory holds at most
/// `retain` recent entries.
pub struct EventJournal {
    state: Mutex<JournalState>,
    path: Option<PathBuf>,
    retain: usize,
}

impl EventJournal {
    pub fn in_memory() -> Self {
        Self::build(None)
    }

    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self::build(Some(path.into()))
    }

    fn build(path: Option<PathBuf>) -> Self {
        Self {
            state: Mutex::new(JournalState {
                recent: VecDeque::new(),
                file: None,
            }),
            path,
            retain: JOURNAL_RETAINED_ENTRIES,
        }
    }

    /// Cap the in-memory window.
    pub fn with_retention(mut self, retain: usize) -> Self {
        self.retain = retain.max(1);
        self
    }

    /// Start a fresh journal, truncating any previous file.
    pub async fn initialize(&self) -> ClusterResult<()> {
        let mut state = self.state.lock().await;
        state.recent.clear();
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await?;
        state.file = Some(file);
        Ok(())
    }

    /// Append an entry.
    ///
    /// A failed write is logged; the entry is still kept in memory.
    pub async fn append(&self, action: JournalAction, peer: &NodeId) {
        let entry = JournalEntry {
            timestamp: format_timestamp(Utc::now()),
            action,
            peer: peer.clone(),
        };

        let mut state = self.state.lock().await;
        if let Some(file) = state.file.as_mut()
            && let Err(e) = write_line(file, &entry).await
        {
            warn!(
                path = ?self.path.as_deref().map(|p| p.display().to_string()),
                error = %e,
                "Failed to append to event journal"
            );
        }

        if state.recent.len() == self.retain {
            state.recent.pop_front();
        }
        state.recent.push_back(entry);
    }

    /// Retained entries in append order.
    pub async fn entries(&self) -> Vec<JournalEntry> {
        self.state.lock().await.recent.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.recent.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.recent.is_empty()
    }

    /// Number of retained entries with the given action and peer.
    pub async fn count(&self, action: JournalAction, peer: &NodeId) -> usize {
        self.state
            .lock()
            .await
            .recent
            .iter()
            .filter(|e| e.action == action && &e.peer == peer)
            .count()
    }
}

async fn write_line(file: &mut File, entry: &JournalEntry) -> ClusterResult<()> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}
