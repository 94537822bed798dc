//! Node roles and the transitions between them.
//!
//! ```text
//!              BecameLeader
//!     ┌──────────────────────────────┐
//!     │                              ▼
//! ┌─────────┐  LeaderTimedOut  ┌───────────┐
//! │Follower │ ───────────────▶ │ Candidate │
//! └─────────┘                  └───────────┘
//!   ▲    ▲    FollowLeader(id)       │
//!   │    └───────────────────────────┘
//!   │                                │ BecameLeader
//!   │ Deposed(id)              ┌───────────┐
//!   └───────────────────────── │  Leader   │
//!                              └───────────┘
//! ```
//!
//! [`transition`] is pure: it decides the next role, and the node's
//! supervisor carries out the side effects (stopping and spawning tasks).
//! The supervisor also discards events raised under an earlier role, so
//! `transition` only ever sees events about the current one.

use std::fmt;

use crate::types::NodeId;

/// State carried while leading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderState {
    /// Heartbeat rounds completed in this term of leadership.
    pub rounds: u64,
}

/// State carried while following.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerState {
    pub leader_id: NodeId,
}

/// State carried while an election is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateState {
    /// The leader that was declared dead.
    pub previous_leader: Option<NodeId>,
}

/// The role a node currently plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRole {
    Leader(LeaderState),
    Follower(FollowerState),
    Candidate(CandidateState),
}

impl NodeRole {
    pub fn leader() -> Self {
        NodeRole::Leader(LeaderState::default())
    }

    pub fn follower(leader_id: NodeId) -> Self {
        NodeRole::Follower(FollowerState { leader_id })
    }

    pub fn candidate(previous_leader: Option<NodeId>) -> Self {
        NodeRole::Candidate(CandidateState { previous_leader })
    }

    pub fn is_leader(&self) -> bool {
        matches!(self, NodeRole::Leader(_))
    }

    pub fn is_follower(&self) -> bool {
        matches!(self, NodeRole::Follower(_))
    }

    pub fn is_candidate(&self) -> bool {
        matches!(self, NodeRole::Candidate(_))
    }

    /// Leader this node follows, if it is a follower.
    pub fn followed_leader(&self) -> Option<&NodeId> {
        match self {
            NodeRole::Follower(state) => Some(&state.leader_id),
            _ => None,
        }
    }

    /// Short role name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            NodeRole::Leader(_) => "leader",
            NodeRole::Follower(_) => "follower",
            NodeRole::Candidate(_) => "candidate",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Follower(state) => write!(f, "follower of {}", state.leader_id),
            other => f.write_str(other.name()),
        }
    }
}

/// Something that may change a node's role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleEvent {
    /// The directory now names this node as leader.
    BecameLeader,
    /// The directory names another node as leader.
    FollowLeader(NodeId),
    /// The named leader missed its heartbeat timeout. Ignored unless it is
    /// the leader currently followed.
    LeaderTimedOut(NodeId),
    /// A leader found another node recorded as leader.
    Deposed(NodeId),
}

impl fmt::Display for RoleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleEvent::BecameLeader => write!(f, "became leader"),
            RoleEvent::FollowLeader(id) => write!(f, "follow leader {}", id),
            RoleEvent::LeaderTimedOut(id) => write!(f, "leader {} timed out", id),
            RoleEvent::Deposed(id) => write!(f, "deposed by {}", id),
        }
    }
}

/// Decide the role that follows `event`.
///
/// Returns `None` when the event does not apply to the current role or
/// would not change it, in which case the running tasks are left alone.
pub fn transition(current: &NodeRole, event: RoleEvent) -> Option<NodeRole> {
    match (current, event) {
        (NodeRole::Leader(_), RoleEvent::BecameLeader) => None,
        (_, RoleEvent::BecameLeader) => Some(NodeRole::leader()),

        (NodeRole::Follower(state), RoleEvent::FollowLeader(id)) if state.leader_id == id => None,
        (_, RoleEvent::FollowLeader(id)) => Some(NodeRole::follower(id)),

        (NodeRole::Follower(state), RoleEvent::LeaderTimedOut(id)) if state.leader_id == id => {
            Some(NodeRole::candidate(Some(id)))
        }
        (_, RoleEvent::LeaderTimedOut(_)) => None,

        (NodeRole::Leader(_), RoleEvent::Deposed(id)) => Some(NodeRole::follower(id)),
        (_, RoleEvent::Deposed(_)) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn test_transition_table() {
        let leader = NodeRole::leader();
        let follower_a = NodeRole::follower(node("a"));
        let candidate = NodeRole::candidate(Some(node("a")));

        let cases = vec![
            (&leader, RoleEvent::BecameLeader, None),
            (&follower_a, RoleEvent::BecameLeader, Some(NodeRole::leader())),
            (&candidate, RoleEvent::BecameLeader, Some(NodeRole::leader())),
            (&leader, RoleEvent::FollowLeader(node("b")), Some(NodeRole::follower(node("b")))),
            (&follower_a, RoleEvent::FollowLeader(node("a")), None),
            (&follower_a, RoleEvent::FollowLeader(node("b")), Some(NodeRole::follower(node("b")))),
            (&candidate, RoleEvent::FollowLeader(node("b")), Some(NodeRole::follower(node("b")))),
            (&follower_a, RoleEvent::LeaderTimedOut(node("a")), Some(NodeRole::candidate(Some(node("a"))))),
            (&follower_a, RoleEvent::LeaderTimedOut(node("c")), None),
            (&leader, RoleEvent::LeaderTimedOut(node("a")), None),
            (&candidate, RoleEvent::LeaderTimedOut(node("a")), None),
            (&leader, RoleEvent::Deposed(node("b")), Some(NodeRole::follower(node("b")))),
            (&follower_a, RoleEvent::Deposed(node("b")), None),
            (&candidate, RoleEvent::Deposed(node("b")), None),
        ];

        for (from, event, expected) in cases {
            let label = format!("{} + {}", from, event);
            assert_eq!(transition(from, event), expected, "{}", label);
        }
    }

    #[test]
    fn test_role_queries() {
        let follower = NodeRole::follower(node("a"));
        assert!(follower.is_follower());
        assert_eq!(follower.followed_leader(), Some(&node("a")));
        assert_eq!(follower.to_string(), "follower of a");

        assert!(NodeRole::leader().is_leader());
        assert_eq!(NodeRole::leader().followed_leader(), None);
        assert!(NodeRole::candidate(None).is_candidate());
        assert_eq!(NodeRole::candidate(None).name(), "candidate");
    }
}
