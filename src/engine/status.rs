// SPDX-License-Identifier: MIT

//! Node and execution lifecycle states
//!
//! The node state machine is enforced in two places: the compiler assigns
//! initial states and the runner/reconciler perform transitions. A node never
//! moves backward, and terminal records are immutable.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Pre-plan placeholder, never persisted by the compiler
    Init,
    /// Created; dependencies unsatisfied, or satisfied but unclaimed
    Waiting,
    /// Claimed by exactly one runner
    Executing,
    Finish,
    Failed,
}

impl NodeStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Finish | NodeStatus::Failed)
    }

    /// Whether the node still counts as active for aggregate/requeue purposes
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether a runner may still claim this node
    pub fn is_claimable(&self) -> bool {
        matches!(self, NodeStatus::Init | NodeStatus::Waiting)
    }

    /// Legal forward transitions of the node state machine
    pub fn can_transition(&self, to: NodeStatus) -> bool {
        matches!(
            (self, to),
            (NodeStatus::Init, NodeStatus::Waiting)
                | (NodeStatus::Waiting, NodeStatus::Executing)
                | (NodeStatus::Executing, NodeStatus::Finish)
                | (NodeStatus::Executing, NodeStatus::Failed)
                // Reconciler fast-forward for pass-through node types
                | (NodeStatus::Waiting, NodeStatus::Finish)
        )
    }
}

/// Aggregate status of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Executing,
    Finish,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Finish | ExecutionStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(NodeStatus::Finish.is_terminal());
        assert!(NodeStatus::Failed.is_terminal());
        assert!(!NodeStatus::Waiting.is_terminal());
        assert!(!NodeStatus::Executing.is_terminal());
        assert!(!NodeStatus::Init.is_terminal());
    }

    #[test]
    fn test_claimable_states() {
        assert!(NodeStatus::Init.is_claimable());
        assert!(NodeStatus::Waiting.is_claimable());
        assert!(!NodeStatus::Executing.is_claimable());
        assert!(!NodeStatus::Finish.is_claimable());
        assert!(!NodeStatus::Failed.is_claimable());
    }

    #[test]
    fn test_no_transition_away_from_terminal() {
        for from in [NodeStatus::Finish, NodeStatus::Failed] {
            for to in [
                NodeStatus::Init,
                NodeStatus::Waiting,
                NodeStatus::Executing,
                NodeStatus::Finish,
                NodeStatus::Failed,
            ] {
                assert!(!from.can_transition(to), "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn test_legal_forward_transitions() {
        assert!(NodeStatus::Waiting.can_transition(NodeStatus::Executing));
        assert!(NodeStatus::Executing.can_transition(NodeStatus::Finish));
        assert!(NodeStatus::Executing.can_transition(NodeStatus::Failed));
        assert!(NodeStatus::Waiting.can_transition(NodeStatus::Finish));
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!NodeStatus::Executing.can_transition(NodeStatus::Waiting));
        assert!(!NodeStatus::Waiting.can_transition(NodeStatus::Init));
        assert!(!NodeStatus::Executing.can_transition(NodeStatus::Init));
    }

    #[test]
    fn test_status_serde_tags() {
        assert_eq!(
            serde_json::to_value(NodeStatus::Waiting).unwrap(),
            serde_json::json!("waiting")
        );
        assert_eq!(
            serde_json::to_value(ExecutionStatus::Finish).unwrap(),
            serde_json::json!("finish")
        );
    }
}
