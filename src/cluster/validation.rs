//! Boundary validation for registration input.
//!
//! Every registration request is checked here before it reaches the
//! metadata store, so the store itself only ever holds well-formed records.
//!
//! # Usage
//!
//! ```
//! use kafkaesque_controller::cluster::validation::{validate_topic_name, validate_port};
//!
//! assert!(validate_topic_name("orders").is_ok());
//! assert!(validate_port(9092).is_ok());
//!
//! assert!(validate_topic_name("").is_err());
//! assert!(validate_port(0).is_err());
//! ```
//!
//! # Topic Name Rules
//!
//! Topic names must:
//! - Not be empty
//! - Not exceed 249 characters
//! - Contain only ASCII alphanumeric characters, dots (`.`), underscores (`_`), and hyphens (`-`)
//! - Not be "." or ".." (reserved filesystem names)
//! - Not start with a hyphen (could be interpreted as CLI flags)

use super::error::{ClusterError, ClusterResult};
use crate::constants::{MAX_HOST_LENGTH, MAX_TOPIC_NAME_LENGTH};
use crate::types::{BrokerId, NodeId, PartitionId};

/// Security protocols a broker may advertise.
pub const SECURITY_PROTOCOLS: &[&str] = &["PLAINTEXT", "SSL", "SASL_PLAINTEXT", "SASL_SSL"];

/// Validate a topic name following Apache Kafka's naming conventions.
pub fn validate_topic_name(topic: &str) -> ClusterResult<()> {
    validate_identifier(topic, MAX_TOPIC_NAME_LENGTH, "Topic name")
}

/// Validate a broker host name or address.
pub fn validate_host(host: &str) -> ClusterResult<()> {
    if host.trim().is_empty() {
        return Err(ClusterError::Validation("Host cannot be empty".to_string()));
    }
    if host.len() > MAX_HOST_LENGTH {
        return Err(ClusterError::Validation(format!(
            "Host '{}' is too long ({} chars, max {} chars)",
            truncate_for_display(host, 50),
            host.len(),
            MAX_HOST_LENGTH
        )));
    }
    if host.chars().any(|c| c.is_ascii_control() || c.is_whitespace()) {
        return Err(ClusterError::Validation(format!(
            "Host '{}' contains whitespace or control characters",
            host.escape_default()
        )));
    }
    Ok(())
}

/// Validate a TCP port.
pub fn validate_port(port: i32) -> ClusterResult<()> {
    if !(1..=65535).contains(&port) {
        return Err(ClusterError::Validation(format!(
            "Port must be between 1 and 65535, got {}",
            port
        )));
    }
    Ok(())
}

/// Validate a broker id.
pub fn validate_broker_id(broker_id: BrokerId) -> ClusterResult<()> {
    if !broker_id.is_valid() {
        return Err(ClusterError::Validation(format!(
            "Broker id must be non-negative, got {}",
            broker_id
        )));
    }
    Ok(())
}

/// Validate a partition id.
pub fn validate_partition_id(partition_id: PartitionId) -> ClusterResult<()> {
    if !partition_id.is_valid() {
        return Err(ClusterError::Validation(format!(
            "Partition id must be non-negative, got {}",
            partition_id
        )));
    }
    Ok(())
}

/// Validate an advertised security protocol name.
pub fn validate_security_protocol(protocol: &str) -> ClusterResult<()> {
    if SECURITY_PROTOCOLS.contains(&protocol) {
        Ok(())
    } else {
        Err(ClusterError::Validation(format!(
            "Unknown security protocol '{}'. Expected one of: {}",
            protocol.escape_default(),
            SECURITY_PROTOCOLS.join(", ")
        )))
    }
}

/// Validate a partition's replica assignment.
///
/// - replicas must be non-empty and unique
/// - the leader must be one of the replicas
/// - every ISR member must be a replica
pub fn validate_replica_assignment(
    replicas: &[NodeId],
    isr: &[NodeId],
    leader: &NodeId,
) -> ClusterResult<()> {
    if replicas.is_empty() {
        return Err(ClusterError::Validation(
            "Partition must have at least one replica".to_string(),
        ));
    }

    for (i, replica) in replicas.iter().enumerate() {
        if replicas[..i].contains(replica) {
            return Err(ClusterError::Validation(format!(
                "Replica {} is listed more than once",
                replica
            )));
        }
    }

    if !replicas.contains(leader) {
        return Err(ClusterError::Validation(format!(
            "Partition leader {} is not one of its replicas",
            leader
        )));
    }

    if let Some(outsider) = isr.iter().find(|id| !replicas.contains(id)) {
        return Err(ClusterError::Validation(format!(
            "ISR member {} is not one of the partition's replicas",
            outsider
        )));
    }

    Ok(())
}

/// Core identifier validation logic.
fn validate_identifier(value: &str, max_len: usize, field_name: &str) -> ClusterResult<()> {
    if value.is_empty() {
        return Err(ClusterError::Validation(format!(
            "{} cannot be empty",
            field_name
        )));
    }

    if value.len() > max_len {
        return Err(ClusterError::Validation(format!(
            "{} '{}' is too long ({} chars, max {} chars)",
            field_name,
            truncate_for_display(value, 50),
            value.len(),
            max_len
        )));
    }

    if value == "." || value == ".." {
        return Err(ClusterError::Validation(format!(
            "{} cannot be '.' or '..' (reserved names)",
            field_name
        )));
    }

    if value.starts_with('-') {
        return Err(ClusterError::Validation(format!(
            "{} '{}' cannot start with a hyphen",
            field_name,
            truncate_for_display(value, 50)
        )));
    }

    for (i, c) in value.chars().enumerate() {
        if c.is_ascii_control() {
            return Err(ClusterError::Validation(format!(
                "{} contains control character at position {} (byte value 0x{:02X})",
                field_name, i, c as u8
            )));
        }

        let is_valid = c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-';
        if !is_valid {
            return Err(ClusterError::Validation(format!(
                "Invalid character '{}' (U+{:04X}) in {} at position {}. \
                 Only ASCII letters, digits, '.', '_', and '-' are allowed.",
                c.escape_default(),
                c as u32,
                field_name,
                i
            )));
        }
    }

    Ok(())
}

/// Truncate a string for display in error messages.
fn truncate_for_display(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let cut = (0..=max_len)
            .rev()
            .find(|i| s.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}...", &s[..cut])
    }
}
