//! Topic domain.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Section;

/// A registered topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub name: String,
    #[serde(rename = "topicUUID")]
    pub topic_uuid: Uuid,
}

/// Commands for the topic domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicCommand {
    /// Register a topic. `topic_uuid` is only used if the name is new.
    Register { name: String, topic_uuid: Uuid },

    /// Remove a topic by name.
    Delete { name: String },
}

/// Responses from topic domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicResponse {
    Registered { topic_uuid: Uuid, created: bool },
    Deleted(TopicRecord),
    NotFound { name: String },
}

impl Section<TopicRecord> {
    pub fn get(&self, name: &str) -> Option<&TopicRecord> {
        self.records.iter().find(|t| t.name == name)
    }

    /// Apply a topic command.
    pub fn apply(&mut self, cmd: TopicCommand, at: &str) -> TopicResponse {
        match cmd {
            TopicCommand::Register { name, topic_uuid } => {
                if let Some(existing) = self.get(&name) {
                    return TopicResponse::Registered {
                        topic_uuid: existing.topic_uuid,
                        created: false,
                    };
                }
                self.records.push(TopicRecord { name, topic_uuid });
                self.touch(at);
                TopicResponse::Registered {
                    topic_uuid,
                    created: true,
                }
            }

            TopicCommand::Delete { name } => match self.remove_where(|t| t.name == name) {
                Some(record) => {
                    self.touch(at);
                    TopicResponse::Deleted(record)
                }
                None => TopicResponse::NotFound { name },
            },
        }
    }
}
