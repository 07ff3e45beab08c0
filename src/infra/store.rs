// SPDX-License-Identifier: MIT

//! Execution persistence collaborator
//!
//! The engine reads and writes execution records through `ExecutionStore`.
//! The contract deliberately includes conditional updates: the runner's
//! claim and the abort controller's bulk fail both rely on
//! update-if-status-matches semantics to tolerate racing workers.

use crate::engine::records::{NodeExecution, WorkflowExecution};
use crate::engine::status::{ExecutionStatus, NodeStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Field-wise update of a node-execution record
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub status: Option<NodeStatus>,
    pub progress: Option<u8>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl NodeUpdate {
    /// Update marking a node finished
    pub fn finished(finished_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(NodeStatus::Finish),
            progress: Some(100),
            finished_at: Some(finished_at),
            ..Default::default()
        }
    }

    /// Update marking a node failed with a message
    pub fn failed(message: impl Into<String>, finished_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(NodeStatus::Failed),
            finished_at: Some(finished_at),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Field-wise update of a workflow-execution record
#[derive(Debug, Clone, Default)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub executed_nodes: Option<u32>,
    pub failed_nodes: Option<u32>,
    pub aborted_by_user: Option<bool>,
}

/// Persistence contract for the two execution entities
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, execution: WorkflowExecution) -> Result<()>;

    async fn create_node_executions(&self, nodes: Vec<NodeExecution>) -> Result<()>;

    async fn get_execution(&self, execution_id: &str) -> Result<Option<WorkflowExecution>>;

    async fn get_node(&self, execution_id: &str, node_id: &str) -> Result<Option<NodeExecution>>;

    async fn list_nodes(&self, execution_id: &str) -> Result<Vec<NodeExecution>>;

    async fn update_execution(&self, execution_id: &str, update: ExecutionUpdate) -> Result<()>;

    /// Guarded update: applies only while the execution is non-terminal.
    /// Returns whether anything changed.
    async fn update_execution_if_active(
        &self,
        execution_id: &str,
        update: ExecutionUpdate,
    ) -> Result<bool>;

    async fn update_node(
        &self,
        execution_id: &str,
        node_id: &str,
        update: NodeUpdate,
    ) -> Result<()>;

    /// Conditional update: applies only while the node's status is one of
    /// `expected`. A `false` return signals a lost race.
    async fn update_node_if(
        &self,
        execution_id: &str,
        node_id: &str,
        expected: &[NodeStatus],
        update: NodeUpdate,
    ) -> Result<bool>;

    /// Count nodes among `node_ids` currently in `status`
    async fn count_nodes_with_status(
        &self,
        execution_id: &str,
        node_ids: &[String],
        status: NodeStatus,
    ) -> Result<usize>;

    /// Bulk-fail every non-terminal node of an execution. Returns the number
    /// of records updated; terminal records are never touched.
    async fn fail_active_nodes(
        &self,
        execution_id: &str,
        error_message: &str,
        finished_at: DateTime<Utc>,
    ) -> Result<usize>;
}

fn apply_node_update(node: &mut NodeExecution, update: NodeUpdate) {
    if let Some(status) = update.status {
        node.status = status;
    }
    if let Some(progress) = update.progress {
        node.progress = progress;
    }
    if let Some(started_at) = update.started_at {
        node.started_at = Some(started_at);
    }
    if let Some(finished_at) = update.finished_at {
        node.finished_at = Some(finished_at);
    }
    if let Some(error_message) = update.error_message {
        node.error_message = Some(error_message);
    }
}

fn apply_execution_update(execution: &mut WorkflowExecution, update: ExecutionUpdate) {
    if let Some(status) = update.status {
        execution.status = status;
    }
    if let Some(executed) = update.executed_nodes {
        execution.executed_nodes = executed;
    }
    if let Some(failed) = update.failed_nodes {
        execution.failed_nodes = failed;
    }
    if let Some(aborted) = update.aborted_by_user {
        execution.aborted_by_user = aborted;
    }
}

#[derive(Default)]
struct StoreInner {
    executions: HashMap<String, WorkflowExecution>,
    // Node records keyed by execution id, in creation order
    nodes: HashMap<String, Vec<NodeExecution>>,
}

/// In-memory execution store used by tests and the bundled binary
#[derive(Clone, Default)]
pub struct InMemoryExecutionStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create_execution(&self, execution: WorkflowExecution) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .executions
            .insert(execution.execution_id.clone(), execution);
        Ok(())
    }

    async fn create_node_executions(&self, nodes: Vec<NodeExecution>) -> Result<()> {
        let mut inner = self.inner.write().await;
        for node in nodes {
            inner
                .nodes
                .entry(node.execution_id.clone())
                .or_default()
                .push(node);
        }
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<WorkflowExecution>> {
        let inner = self.inner.read().await;
        Ok(inner.executions.get(execution_id).cloned())
    }

    async fn get_node(&self, execution_id: &str, node_id: &str) -> Result<Option<NodeExecution>> {
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .get(execution_id)
            .and_then(|nodes| nodes.iter().find(|n| n.node_id == node_id))
            .cloned())
    }

    async fn list_nodes(&self, execution_id: &str) -> Result<Vec<NodeExecution>> {
        let inner = self.inner.read().await;
        Ok(inner.nodes.get(execution_id).cloned().unwrap_or_default())
    }

    async fn update_execution(&self, execution_id: &str, update: ExecutionUpdate) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(execution) = inner.executions.get_mut(execution_id) {
            apply_execution_update(execution, update);
        }
        Ok(())
    }

    async fn update_execution_if_active(
        &self,
        execution_id: &str,
        update: ExecutionUpdate,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.executions.get_mut(execution_id) {
            Some(execution) if !execution.status.is_terminal() => {
                apply_execution_update(execution, update);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_node(
        &self,
        execution_id: &str,
        node_id: &str,
        update: NodeUpdate,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(node) = inner
            .nodes
            .get_mut(execution_id)
            .and_then(|nodes| nodes.iter_mut().find(|n| n.node_id == node_id))
        {
            // Terminal records are immutable
            if node.status.is_terminal() {
                return Ok(());
            }
            apply_node_update(node, update);
        }
        Ok(())
    }

    async fn update_node_if(
        &self,
        execution_id: &str,
        node_id: &str,
        expected: &[NodeStatus],
        update: NodeUpdate,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner
            .nodes
            .get_mut(execution_id)
            .and_then(|nodes| nodes.iter_mut().find(|n| n.node_id == node_id))
        {
            Some(node) if expected.contains(&node.status) => {
                apply_node_update(node, update);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_nodes_with_status(
        &self,
        execution_id: &str,
        node_ids: &[String],
        status: NodeStatus,
    ) -> Result<usize> {
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .get(execution_id)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter(|n| node_ids.contains(&n.node_id) && n.status == status)
                    .count()
            })
            .unwrap_or(0))
    }

    async fn fail_active_nodes(
        &self,
        execution_id: &str,
        error_message: &str,
        finished_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        if let Some(nodes) = inner.nodes.get_mut(execution_id) {
            for node in nodes.iter_mut().filter(|n| n.status.is_active()) {
                node.status = NodeStatus::Failed;
                node.error_message = Some(error_message.to_string());
                node.finished_at = Some(finished_at);
                updated += 1;
            }
        }
        Ok(updated)
    }
}
