// SPDX-License-Identifier: MIT

//! Persisted execution records
//!
//! One `WorkflowExecution` per canvas run, with one `NodeExecution` per
//! canvas node. Executions are created once by the service, mutated only by
//! the reconciler (status/counters) and the abort controller (terminal
//! status); node records are mutated field-by-field by the runner and the
//! reconciler and become immutable once terminal.

use crate::canvas::types::{CanvasNode, ConnectionFilter, NodeType, WorkflowVariable};
use crate::engine::status::{ExecutionStatus, NodeStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution variant: clone into a fresh canvas vs. execute in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeBehavior {
    /// Clone the source graph into a fresh target canvas with fresh ids
    Create,
    /// Execute in the source canvas
    Update,
}

/// One invocation of a canvas
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub execution_id: String,
    pub uid: String,
    pub canvas_id: String,
    /// Differs from `canvas_id` when cloning
    pub source_canvas_id: String,
    pub variables: Vec<WorkflowVariable>,
    pub title: String,
    pub status: ExecutionStatus,
    pub total_nodes: u32,
    pub executed_nodes: u32,
    pub failed_nodes: u32,
    /// Owning application, for downstream commission accounting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default)]
    pub aborted_by_user: bool,
}

/// One node's execution record within an execution
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecution {
    pub node_execution_id: String,
    pub execution_id: String,
    pub canvas_id: String,
    /// Node id as it exists in the target canvas; freshly generated in
    /// clone mode
    pub node_id: String,
    pub node_type: NodeType,
    pub entity_id: String,
    /// Full node snapshot, remapped in clone mode
    pub node_data: CanvasNode,
    pub title: String,
    pub status: NodeStatus,
    pub progress: u8,
    pub processed_query: String,
    pub original_query: String,
    /// How this node attaches to its parents in the target canvas
    #[serde(default)]
    pub connect_to: Vec<ConnectionFilter>,
    #[serde(default)]
    pub parent_node_ids: Vec<String>,
    #[serde(default)]
    pub child_node_ids: Vec<String>,
    /// Original-canvas identifiers, preserved verbatim under remapping
    pub source_node_id: String,
    pub source_entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Compiler output: create-records plus the initial scheduling frontier
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub node_executions: Vec<NodeExecution>,
    pub start_nodes: Vec<String>,
}

impl ExecutionPlan {
    /// A plan with zero executable nodes finishes immediately
    pub fn is_empty(&self) -> bool {
        self.node_executions.is_empty()
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeExecution> {
        self.node_executions.iter().find(|n| n.node_id == node_id)
    }
}
