//! Heartbeat-based leader failure detection.
//!
//! A follower tracks the silence since the last heartbeat it received from
//! its leader and classifies the leader as:
//!
//! 1. **Healthy** - heartbeats arrive within one interval (plus jitter)
//! 2. **Suspected** - at least one heartbeat is late (potential network blip)
//! 3. **Failed** - the silence exceeded the heartbeat timeout
//!
//! Only `Failed` starts an election. The suspicion state exists so that a
//! single late beat shows up in the logs without triggering a failover.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::types::NodeId;

/// Configuration for the leader monitor.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitorConfig {
    /// How often the leader sends heartbeats.
    pub heartbeat_interval: Duration,

    /// Silence after which the leader is declared failed.
    pub timeout: Duration,

    /// Lateness tolerated before a heartbeat counts as missed.
    ///
    /// Absorbs network jitter and scheduling delays.
    pub jitter_tolerance: Duration,
}

impl Default for HeartbeatMonitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
            jitter_tolerance: Duration::from_millis(50),
        }
    }
}

impl HeartbeatMonitorConfig {
    /// Silence after which the leader becomes suspected.
    pub fn suspicion_time(&self) -> Duration {
        self.heartbeat_interval + self.jitter_tolerance
    }

    /// Silence after which the leader is declared failed.
    pub fn detection_time(&self) -> Duration {
        self.timeout
    }

    /// Classify a silence of `elapsed`.
    pub fn classify(&self, elapsed: Duration) -> LeaderHealthState {
        if elapsed > self.detection_time() {
            LeaderHealthState::Failed
        } else if elapsed > self.suspicion_time() {
            LeaderHealthState::Suspected
        } else {
            LeaderHealthState::Healthy
        }
    }
}

/// Health of the leader from a follower's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderHealthState {
    /// Heartbeats received on time.
    Healthy,
    /// A heartbeat is late.
    Suspected,
    /// The heartbeat timeout expired.
    Failed,
}

impl std::fmt::Display for LeaderHealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaderHealthState::Healthy => write!(f, "healthy"),
            LeaderHealthState::Suspected => write!(f, "suspected"),
            LeaderHealthState::Failed => write!(f, "failed"),
        }
    }
}

/// Emitted when the leader's health state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStateChange {
    pub leader_id: NodeId,
    pub previous_state: LeaderHealthState,
    pub new_state: LeaderHealthState,
    pub time_since_last_heartbeat: Duration,
}

/// Tracks the health of one leader.
///
/// Owned by the follower's monitor loop; the loop feeds it the silence
/// measured against the metadata store's heartbeat clock on every tick.
#[derive(Debug)]
pub struct LeaderMonitor {
    config: HeartbeatMonitorConfig,
    leader_id: NodeId,
    state: LeaderHealthState,
    suspicions: u64,
    recoveries: u64,
}

impl LeaderMonitor {
    pub fn new(config: HeartbeatMonitorConfig, leader_id: NodeId) -> Self {
        debug!(
            leader_id = %leader_id,
            suspicion_ms = config.suspicion_time().as_millis() as u64,
            detection_ms = config.detection_time().as_millis() as u64,
            "Monitoring leader heartbeats"
        );
        Self {
            config,
            leader_id,
            state: LeaderHealthState::Healthy,
            suspicions: 0,
            recoveries: 0,
        }
    }

    pub fn config(&self) -> &HeartbeatMonitorConfig {
        &self.config
    }

    pub fn leader_id(&self) -> &NodeId {
        &self.leader_id
    }

    /// Current health state.
    pub fn state(&self) -> LeaderHealthState {
        self.state
    }

    /// Number of times the leader went from healthy to suspected.
    pub fn suspicions(&self) -> u64 {
        self.suspicions
    }

    /// Number of times a suspected leader recovered without failing.
    pub fn recoveries(&self) -> u64 {
        self.recoveries
    }

    /// Record the current silence and return the state change, if any.
    pub fn observe(&mut self, since_last_heartbeat: Duration) -> Option<HealthStateChange> {
        let new_state = self.config.classify(since_last_heartbeat);
        if new_state == self.state {
            return None;
        }

        let previous_state = self.state;
        self.state = new_state;

        match (previous_state, new_state) {
            (LeaderHealthState::Healthy, LeaderHealthState::Suspected) => {
                self.suspicions += 1;
                info!(
                    leader_id = %self.leader_id,
                    silence_ms = since_last_heartbeat.as_millis() as u64,
                    "Leader suspected: heartbeat late"
                );
            }
            (LeaderHealthState::Suspected, LeaderHealthState::Healthy) => {
                self.recoveries += 1;
                info!(leader_id = %self.leader_id, "Leader recovered");
            }
            (_, LeaderHealthState::Failed) => {
                warn!(
                    leader_id = %self.leader_id,
                    silence_ms = since_last_heartbeat.as_millis() as u64,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Leader failed: heartbeat timeout exceeded"
                );
            }
            _ => {
                debug!(
                    leader_id = %self.leader_id,
                    from = %previous_state,
                    to = %new_state,
                    "Leader health changed"
                );
            }
        }

        Some(HealthStateChange {
            leader_id: self.leader_id.clone(),
            previous_state,
            new_state,
            time_since_last_heartbeat: since_last_heartbeat,
        })
    }

    /// Whether the leader is currently declared failed.
    pub fn is_failed(&self) -> bool {
        self.state == LeaderHealthState::Failed
    }
}
