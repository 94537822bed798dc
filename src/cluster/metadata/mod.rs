//! Replicated metadata: the record store every controller node holds.
//!
//! The store is split into record-type sections, each with its own
//! last-mutation timestamp. Mutations are expressed as per-domain commands
//! applied to the sections, the same shape for every domain:
//!
//! - [`broker`]: broker registration and the broker-change log
//! - [`topic`]: topic registration
//! - [`partition`]: partition registration
//! - [`producer`]: producer id registration (needs broker context)
//!
//! [`MetadataStoreHandle`] wraps the store behind the node's single writer
//! lock; [`EventJournal`] records heartbeat traffic for diagnostics.

pub mod broker;
pub mod commands;
pub mod journal;
pub mod partition;
pub mod producer;
pub mod registry;
pub mod store;
pub mod topic;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TIMESTAMP_FORMAT;

pub use broker::{
    BrokerChangeRecord, BrokerCommand, BrokerRecord, BrokerResponse, BrokerStatus,
};
pub use commands::{MetadataCommand, MetadataResponse};
pub use journal::{EventJournal, JournalAction, JournalEntry};
pub use partition::{PartitionCommand, PartitionRecord, PartitionResponse};
pub use producer::{ProducerCommand, ProducerIdsRecord, ProducerResponse};
pub use registry::{
    BrokerChange, BrokerRegistration, ClientMetadata, PartitionRegistration,
    ProducerRegistration, ProducerStatus, TopicRegistration,
};
pub use store::{MetadataStore, MetadataStoreHandle};
pub use topic::{TopicCommand, TopicRecord, TopicResponse};

/// One record-type section of the store.
///
/// `timestamp` is the wall-clock time of the last mutation, or empty if the
/// section was never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub struct Section<R> {
    #[serde(default)]
    pub records: Vec<R>,
    #[serde(default)]
    pub timestamp: String,
}

impl<R> Default for Section<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            timestamp: String::new(),
        }
    }
}

impl<R> Section<R> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Mark the section as mutated at `at`.
    pub fn touch(&mut self, at: &str) {
        self.timestamp = at.to_string();
    }

    /// Remove and return the first record matching `pred`.
    pub fn remove_where(&mut self, pred: impl Fn(&R) -> bool) -> Option<R> {
        let idx = self.records.iter().position(pred)?;
        Some(self.records.remove(idx))
    }
}

/// Format a wall-clock instant the way every persisted timestamp is written.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(format_timestamp(at), "2024-03-09 14:05:07.000000");
    }

    #[test]
    fn test_empty_section_has_empty_timestamp() {
        let section: Section<u32> = Section::default();
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["records"], serde_json::json!([]));
        assert_eq!(json["timestamp"], "");
    }

    #[test]
    fn test_remove_where() {
        let mut section = Section {
            records: vec![1, 2, 3],
            timestamp: String::new(),
        };
        assert_eq!(section.remove_where(|r| *r == 2), Some(2));
        assert_eq!(section.remove_where(|r| *r == 9), None);
        assert_eq!(section.records, vec![1, 3]);
    }
}
