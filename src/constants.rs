//! Centralized controller and wire constants.
//!
//! # Categories
//!
//! - **Membership Constants**: heartbeat, monitor and election timings
//! - **Network Constants**: RPC framing and timeouts
//! - **Storage Constants**: persisted file names and timestamp format

// =============================================================================
// Membership Constants
// =============================================================================

/// How often the leader pushes a heartbeat to every follower.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2_000;

/// How often a follower checks whether the leader is still alive.
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 1_000;

/// Silence after which a follower declares the leader dead.
///
/// Must exceed the heartbeat interval so at least two beats are missed
/// before an election starts.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 5_000;

/// Lower bound of the randomized pre-election backoff.
pub const DEFAULT_ELECTION_BACKOFF_MIN_MS: u64 = 1_000;

/// Upper bound of the randomized pre-election backoff.
pub const DEFAULT_ELECTION_BACKOFF_MAX_MS: u64 = 10_000;

/// Heartbeats arriving within this tolerance are not counted late.
pub const DEFAULT_JITTER_TOLERANCE_MS: u64 = 50;

/// Time given to a role's background tasks to stop before they are aborted.
pub const ROLE_TASK_STOP_TIMEOUT_MS: u64 = 2_000;

// =============================================================================
// Network Constants
// =============================================================================

/// Timeout for establishing a peer connection.
pub const RPC_CONNECT_TIMEOUT_MS: u64 = 1_000;

/// Default timeout for a full request/response exchange with a peer.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 1_500;

/// Largest accepted RPC frame.
///
/// A heartbeat carries the whole metadata store, so this bounds the
/// store size that can be replicated.
pub const MAX_RPC_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Default listen address of a controller node.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7001";

// =============================================================================
// Storage Constants
// =============================================================================

/// Default directory for per-node state files.
pub const DEFAULT_DATA_PATH: &str = "/tmp/kafkaesque-controller";

/// File name of the cluster directory inside the data path.
pub const CLUSTER_DIRECTORY_FILE: &str = "cluster.json";

/// Prefix of the per-node metadata store file.
pub const METADATA_FILE_PREFIX: &str = "metadata";

/// Prefix of the per-node event journal file.
pub const EVENT_JOURNAL_FILE_PREFIX: &str = "events";

/// Journal entries kept in memory; the file keeps every entry.
pub const JOURNAL_RETAINED_ENTRIES: usize = 4096;

/// Textual format of every persisted wall-clock timestamp (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for topic names (Kafka's MAX_NAME_LENGTH).
pub const MAX_TOPIC_NAME_LENGTH: usize = 249;

/// Maximum length for broker host names.
pub const MAX_HOST_LENGTH: usize = 255;
