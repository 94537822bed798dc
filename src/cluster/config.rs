//! Configuration for a controller node.
//!
//! # Configuration Profiles
//!
//! ```rust,no_run
//! use kafkaesque_controller::cluster::{ControllerConfig, ClusterProfile};
//!
//! // Development profile - relaxed timings, easy to step through
//! let dev_config = ControllerConfig::from_profile(ClusterProfile::Development);
//!
//! // Production profile - the documented 2s / 1s / 5s timings
//! let prod_config = ControllerConfig::from_profile(ClusterProfile::Production);
//!
//! // Low-latency profile - fast failure detection and short elections
//! let ll_config = ControllerConfig::from_profile(ClusterProfile::LowLatency);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    CLUSTER_DIRECTORY_FILE, DEFAULT_DATA_PATH, DEFAULT_ELECTION_BACKOFF_MAX_MS,
    DEFAULT_ELECTION_BACKOFF_MIN_MS, DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_TIMEOUT_MS,
    DEFAULT_JITTER_TOLERANCE_MS, DEFAULT_LISTEN_ADDR, DEFAULT_MONITOR_INTERVAL_MS,
    DEFAULT_RPC_TIMEOUT_MS, EVENT_JOURNAL_FILE_PREFIX, METADATA_FILE_PREFIX,
};
use crate::types::NodeId;

use super::failure_detector::HeartbeatMonitorConfig;

/// Validated timing profiles.
///
/// | Profile | Heartbeat | Monitor | Timeout | Election backoff |
/// |---------|-----------|---------|---------|------------------|
/// | Development | 3s | 1s | 10s | 1-5s |
/// | Production | 2s | 1s | 5s | 1-10s |
/// | LowLatency | 500ms | 250ms | 2s | 250ms-2s |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterProfile {
    /// Relaxed timings for local development and debugging.
    ///
    /// **Not suitable for production use.**
    Development,

    /// The default timings.
    Production,

    /// Aggressive timings for fast failover.
    ///
    /// **Warning:** This profile has tighter margins between heartbeat
    /// interval and timeout. Ensure the network between nodes is reliable.
    LowLatency,
}

impl ClusterProfile {
    /// Get all available profiles.
    pub fn all() -> &'static [ClusterProfile] {
        &[
            ClusterProfile::Development,
            ClusterProfile::Production,
            ClusterProfile::LowLatency,
        ]
    }
}

impl std::fmt::Display for ClusterProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterProfile::Development => write!(f, "development"),
            ClusterProfile::Production => write!(f, "production"),
            ClusterProfile::LowLatency => write!(f, "low-latency"),
        }
    }
}

impl std::str::FromStr for ClusterProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(ClusterProfile::Development),
            "production" | "prod" => Ok(ClusterProfile::Production),
            "low-latency" | "latency" | "ll" => Ok(ClusterProfile::LowLatency),
            _ => Err(format!(
                "Unknown profile '{}'. Valid profiles: development, production, low-latency",
                s
            )),
        }
    }
}

/// Configuration for one controller node.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Identity of this node. Peers dial it, so it must be reachable.
    pub node_id: NodeId,

    /// Address the RPC server binds to.
    pub listen_addr: String,

    /// Directory holding this node's metadata and journal files.
    pub data_path: PathBuf,

    /// Location of the cluster directory shared by every node.
    pub directory_path: PathBuf,

    /// Leader heartbeat tick.
    pub heartbeat_interval: Duration,

    /// Follower liveness check tick.
    pub monitor_interval: Duration,

    /// Silence after which a follower starts an election.
    pub heartbeat_timeout: Duration,

    /// Lower bound of the randomized pre-election sleep.
    pub election_backoff_min: Duration,

    /// Upper bound of the randomized pre-election sleep.
    pub election_backoff_max: Duration,

    /// Bound on a full request/response exchange with a peer.
    pub rpc_timeout: Duration,

    /// Lateness tolerated before a heartbeat counts as missed.
    pub jitter_tolerance: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let data_path = PathBuf::from(DEFAULT_DATA_PATH);
        Self {
            node_id: NodeId::new(DEFAULT_LISTEN_ADDR),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            directory_path: data_path.join(CLUSTER_DIRECTORY_FILE),
            data_path,
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            monitor_interval: Duration::from_millis(DEFAULT_MONITOR_INTERVAL_MS),
            heartbeat_timeout: Duration::from_millis(DEFAULT_HEARTBEAT_TIMEOUT_MS),
            election_backoff_min: Duration::from_millis(DEFAULT_ELECTION_BACKOFF_MIN_MS),
            election_backoff_max: Duration::from_millis(DEFAULT_ELECTION_BACKOFF_MAX_MS),
            rpc_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
            jitter_tolerance: Duration::from_millis(DEFAULT_JITTER_TOLERANCE_MS),
        }
    }
}

impl ControllerConfig {
    /// Create a configuration from a validated profile.
    ///
    /// Individual fields can still be customized afterwards:
    ///
    /// ```rust,no_run
    /// use kafkaesque_controller::cluster::{ControllerConfig, ClusterProfile};
    /// use kafkaesque_controller::types::NodeId;
    ///
    /// let mut config = ControllerConfig::from_profile(ClusterProfile::Production);
    /// config.node_id = NodeId::new("10.0.0.5:7001");
    /// config.listen_addr = "0.0.0.0:7001".to_string();
    /// ```
    pub fn from_profile(profile: ClusterProfile) -> Self {
        let base = Self::default();

        match profile {
            ClusterProfile::Development => Self {
                heartbeat_interval: Duration::from_secs(3),
                monitor_interval: Duration::from_secs(1),
                heartbeat_timeout: Duration::from_secs(10),
                election_backoff_min: Duration::from_secs(1),
                election_backoff_max: Duration::from_secs(5),
                rpc_timeout: Duration::from_secs(2),
                ..base
            },
            ClusterProfile::Production => base,
            ClusterProfile::LowLatency => Self {
                heartbeat_interval: Duration::from_millis(500),
                monitor_interval: Duration::from_millis(250),
                heartbeat_timeout: Duration::from_secs(2),
                election_backoff_min: Duration::from_millis(250),
                election_backoff_max: Duration::from_secs(2),
                rpc_timeout: Duration::from_millis(400),
                jitter_tolerance: Duration::from_millis(25),
                ..base
            },
        }
    }

    /// Profile selected by `CLUSTER_PROFILE`, falling back to production.
    pub fn from_profile_env() -> Self {
        let profile = std::env::var("CLUSTER_PROFILE")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(ClusterProfile::Production);
        Self::from_profile(profile)
    }

    /// Validate the configuration and return any errors found.
    ///
    /// This should be called at startup to catch configuration issues early.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.heartbeat_interval.is_zero() {
            errors.push("heartbeat_interval must be greater than zero".to_string());
        }

        if self.monitor_interval.is_zero() {
            errors.push("monitor_interval must be greater than zero".to_string());
        }

        // At least one full heartbeat must be missable before an election.
        if self.heartbeat_timeout <= self.heartbeat_interval {
            errors.push(format!(
                "heartbeat_timeout ({:?}) must be greater than heartbeat_interval ({:?})",
                self.heartbeat_timeout, self.heartbeat_interval
            ));
        }

        if self.election_backoff_min > self.election_backoff_max {
            errors.push(format!(
                "election_backoff_min ({:?}) must not exceed election_backoff_max ({:?})",
                self.election_backoff_min, self.election_backoff_max
            ));
        }

        if self.rpc_timeout.is_zero() {
            errors.push("rpc_timeout must be greater than zero".to_string());
        }

        if self.node_id.as_str().is_empty() {
            errors.push("node_id must not be empty".to_string());
        }

        if self.listen_addr.is_empty() {
            errors.push("listen_addr must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CLUSTER_PROFILE`: timing profile (default: production)
    /// - `LISTEN_ADDR`: RPC listen address (default: 127.0.0.1:7001)
    /// - `NODE_ID`: advertised node id (default: `LISTEN_ADDR`)
    /// - `DATA_PATH`: per-node state directory (default: /tmp/kafkaesque-controller)
    /// - `DIRECTORY_PATH`: cluster directory file (default: `DATA_PATH`/cluster.json)
    /// - `HEARTBEAT_INTERVAL_MS`, `MONITOR_INTERVAL_MS`, `HEARTBEAT_TIMEOUT_MS`
    /// - `ELECTION_BACKOFF_MIN_MS`, `ELECTION_BACKOFF_MAX_MS`, `RPC_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Self::from_profile_env();

        let listen_addr =
            std::env::var("LISTEN_ADDR").unwrap_or_else(|_| defaults.listen_addr.clone());

        let node_id = NodeId::new(std::env::var("NODE_ID").unwrap_or_else(|_| listen_addr.clone()));

        let data_path = std::env::var("DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| defaults.data_path.clone());

        let directory_path = std::env::var("DIRECTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_path.join(CLUSTER_DIRECTORY_FILE));

        let config = Self {
            node_id,
            listen_addr,
            data_path,
            directory_path,
            heartbeat_interval: duration_ms_from_env(
                "HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval,
            )?,
            monitor_interval: duration_ms_from_env("MONITOR_INTERVAL_MS", defaults.monitor_interval)?,
            heartbeat_timeout: duration_ms_from_env(
                "HEARTBEAT_TIMEOUT_MS",
                defaults.heartbeat_timeout,
            )?,
            election_backoff_min: duration_ms_from_env(
                "ELECTION_BACKOFF_MIN_MS",
                defaults.election_backoff_min,
            )?,
            election_backoff_max: duration_ms_from_env(
                "ELECTION_BACKOFF_MAX_MS",
                defaults.election_backoff_max,
            )?,
            rpc_timeout: duration_ms_from_env("RPC_TIMEOUT_MS", defaults.rpc_timeout)?,
            jitter_tolerance: defaults.jitter_tolerance,
        };

        config.validate().map_err(|errors| errors.join("; "))?;

        Ok(config)
    }

    /// Failure detector settings derived from this config.
    pub fn heartbeat_monitor_config(&self) -> HeartbeatMonitorConfig {
        HeartbeatMonitorConfig {
            heartbeat_interval: self.heartbeat_interval,
            timeout: self.heartbeat_timeout,
            jitter_tolerance: self.jitter_tolerance,
        }
    }

    /// Path of this node's metadata store file.
    pub fn metadata_file_path(&self) -> PathBuf {
        self.data_path
            .join(node_file_name(METADATA_FILE_PREFIX, &self.node_id, "json"))
    }

    /// Path of this node's event journal file (one JSON object per line).
    pub fn journal_file_path(&self) -> PathBuf {
        self.data_path
            .join(node_file_name(EVENT_JOURNAL_FILE_PREFIX, &self.node_id, "jsonl"))
    }

    /// Pick a uniformly random election backoff within the configured bounds.
    pub fn random_election_backoff(&self) -> Duration {
        let min = self.election_backoff_min.as_millis() as u64;
        let max = self.election_backoff_max.as_millis() as u64;
        if max <= min {
            return self.election_backoff_min;
        }
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

fn duration_ms_from_env(
    key: &str,
    default: Duration,
) -> Result<Duration, Box<dyn std::error::Error>> {
    match std::env::var(key) {
        Ok(value) => {
            let ms: u64 = value
                .parse()
                .map_err(|e| format!("Invalid {}: {}", key, e))?;
            Ok(Duration::from_millis(ms))
        }
        Err(_) => Ok(default),
    }
}

/// File name for a per-node state file; address separators are not portable.
fn node_file_name(prefix: &str, node_id: &NodeId, extension: &str) -> String {
    let sanitized: String = node_id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{}-{}.{}", prefix, sanitized, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ControllerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_all_profiles_are_valid() {
        for profile in ClusterProfile::all() {
            let config = ControllerConfig::from_profile(*profile);
            assert!(
                config.validate().is_ok(),
                "profile {} failed validation: {:?}",
                profile,
                config.validate()
            );
        }
    }

    #[test]
    fn test_production_profile_matches_defaults() {
        let config = ControllerConfig::from_profile(ClusterProfile::Production);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(config.monitor_interval, Duration::from_secs(1));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(5));
        assert_eq!(config.election_backoff_min, Duration::from_secs(1));
        assert_eq!(config.election_backoff_max, Duration::from_secs(10));
    }

    #[test]
    fn test_timeout_must_exceed_interval() {
        let config = ControllerConfig {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("heartbeat_timeout")));
    }

    #[test]
    fn test_backoff_bounds_checked() {
        let config = ControllerConfig {
            election_backoff_min: Duration::from_secs(5),
            election_backoff_max: Duration::from_secs(1),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("election_backoff_min")));
    }

    #[test]
    fn test_zero_ticks_rejected() {
        let config = ControllerConfig {
            heartbeat_interval: Duration::ZERO,
            monitor_interval: Duration::ZERO,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.len() >= 2);
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!(
            "dev".parse::<ClusterProfile>().unwrap(),
            ClusterProfile::Development
        );
        assert_eq!(
            "PRODUCTION".parse::<ClusterProfile>().unwrap(),
            ClusterProfile::Production
        );
        assert_eq!(
            "ll".parse::<ClusterProfile>().unwrap(),
            ClusterProfile::LowLatency
        );
        assert!("fast".parse::<ClusterProfile>().is_err());
    }

    #[test]
    fn test_profile_display_round_trips() {
        for profile in ClusterProfile::all() {
            let parsed: ClusterProfile = profile.to_string().parse().unwrap();
            assert_eq!(parsed, *profile);
        }
    }

    #[test]
    fn test_node_file_paths_are_sanitized() {
        let config = ControllerConfig {
            node_id: NodeId::new("127.0.0.1:7002"),
            data_path: PathBuf::from("/var/lib/ctl"),
            ..Default::default()
        };
        assert_eq!(
            config.metadata_file_path(),
            PathBuf::from("/var/lib/ctl/metadata-127.0.0.1_7002.json")
        );
        assert_eq!(
            config.journal_file_path(),
            PathBuf::from("/var/lib/ctl/events-127.0.0.1_7002.jsonl")
        );
    }

    #[test]
    fn test_random_backoff_within_bounds() {
        let config = ControllerConfig {
            election_backoff_min: Duration::from_millis(100),
            election_backoff_max: Duration::from_millis(200),
            ..Default::default()
        };
        for _ in 0..100 {
            let backoff = config.random_election_backoff();
            assert!(backoff >= Duration::from_millis(100));
            assert!(backoff <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_random_backoff_degenerate_range() {
        let config = ControllerConfig {
            election_backoff_min: Duration::from_millis(300),
            election_backoff_max: Duration::from_millis(300),
            ..Default::default()
        };
        assert_eq!(config.random_election_backoff(), Duration::from_millis(300));
    }

    #[test]
    fn test_monitor_config_derivation() {
        let config = ControllerConfig::default();
        let monitor = config.heartbeat_monitor_config();
        assert_eq!(monitor.heartbeat_interval, config.heartbeat_interval);
        assert_eq!(monitor.timeout, config.heartbeat_timeout);
    }
}
