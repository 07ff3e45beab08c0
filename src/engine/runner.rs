// SPDX-License-Identifier: MIT

//! Node runner
//!
//! Consumes "run node" jobs. Each run re-validates everything a stale job
//! could get wrong: the node may be gone, already terminal, claimed by a
//! racing worker, or its parents may not all be finished yet. All of those
//! return `Ok(())` so the queue never retries a job that lost on purpose.

use crate::canvas::store::{CanvasStore, NodeDiff};
use crate::canvas::types::{ContextItem, NodeType};
use crate::engine::records::NodeExecution;
use crate::engine::status::NodeStatus;
use crate::error::{EngineError, Result};
use crate::infra::lock::LockManager;
use crate::infra::skill::{SkillInvocation, SkillInvoker, User};
use crate::infra::store::{ExecutionStore, NodeUpdate};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Lock key guarding a single node of a single execution
pub fn node_lock_key(execution_id: &str, node_id: &str) -> String {
    format!("wf-exec:{}:{}", execution_id, node_id)
}

pub struct NodeRunner {
    store: Arc<dyn ExecutionStore>,
    canvas_store: Arc<dyn CanvasStore>,
    locks: Arc<dyn LockManager>,
    skill: Arc<dyn SkillInvoker>,
}

impl NodeRunner {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        canvas_store: Arc<dyn CanvasStore>,
        locks: Arc<dyn LockManager>,
        skill: Arc<dyn SkillInvoker>,
    ) -> Self {
        Self {
            store,
            canvas_store,
            locks,
            skill,
        }
    }

    /// Run one node of one execution. Benign no-op when the node is missing,
    /// terminal, contended, or its dependencies are unsatisfied.
    pub async fn run_node(&self, execution_id: &str, node_id: &str) -> Result<()> {
        let Some(execution) = self.store.get_execution(execution_id).await? else {
            log::warn!("Run-node job for unknown execution {}", execution_id);
            return Ok(());
        };
        if execution.status.is_terminal() {
            log::info!(
                "Skipping node {} of terminal execution {}",
                node_id,
                execution_id
            );
            return Ok(());
        }

        let lock_key = node_lock_key(execution_id, node_id);
        let Some(release) = self.locks.acquire(&lock_key).await? else {
            log::info!("Node {} of {} is locked elsewhere", node_id, execution_id);
            return Ok(());
        };

        let outcome = self.run_locked(&execution.uid, execution_id, node_id).await;
        release();
        outcome
    }

    async fn run_locked(&self, uid: &str, execution_id: &str, node_id: &str) -> Result<()> {
        let Some(node) = self.store.get_node(execution_id, node_id).await? else {
            log::warn!("No node record for {} in {}", node_id, execution_id);
            return Ok(());
        };
        if !node.status.is_claimable() {
            log::info!(
                "Node {} of {} is {:?}, nothing to run",
                node_id,
                execution_id,
                node.status
            );
            return Ok(());
        }

        // All parents must have finished before the node may start
        if !node.parent_node_ids.is_empty() {
            let finished = self
                .store
                .count_nodes_with_status(execution_id, &node.parent_node_ids, NodeStatus::Finish)
                .await?;
            if finished < node.parent_node_ids.len() {
                log::info!(
                    "Node {} of {} waits on {}/{} parents",
                    node_id,
                    execution_id,
                    node.parent_node_ids.len() - finished,
                    node.parent_node_ids.len()
                );
                return Ok(());
            }
        }

        // Claim under CAS; a racing worker past the lock loses here
        let claimed = self
            .store
            .update_node_if(
                execution_id,
                node_id,
                &[NodeStatus::Init, NodeStatus::Waiting],
                NodeUpdate {
                    status: Some(NodeStatus::Executing),
                    started_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        if !claimed {
            log::info!("Lost claim race for node {} of {}", node_id, execution_id);
            return Ok(());
        }

        match self.execute(uid, &node).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                self.store
                    .update_node(
                        execution_id,
                        node_id,
                        NodeUpdate::failed(message.clone(), Utc::now()),
                    )
                    .await?;
                Err(EngineError::NodeFailed {
                    node_id: node_id.to_string(),
                    message,
                })
            }
        }
    }

    async fn execute(&self, uid: &str, node: &NodeExecution) -> Result<()> {
        match node.node_type {
            NodeType::SkillResponse => self.execute_skill(uid, node).await,
            // Pass-through types carry no independent work
            NodeType::Document
            | NodeType::Resource
            | NodeType::Tool
            | NodeType::CodeArtifact
            | NodeType::Memo => {
                self.store
                    .update_node(
                        &node.execution_id,
                        &node.node_id,
                        NodeUpdate::finished(Utc::now()),
                    )
                    .await
            }
        }
    }

    async fn execute_skill(&self, uid: &str, node: &NodeExecution) -> Result<()> {
        // Reflect the executing state onto the canvas node so the UI follows
        self.canvas_store
            .apply_diff(
                &node.canvas_id,
                vec![NodeDiff {
                    node_id: node.node_id.clone(),
                    set: json!({"status": "executing"}),
                }],
                vec![],
            )
            .await?;

        // Prior AI steps become conversational history; everything else is
        // plain context
        let mut context: Vec<ContextItem> = Vec::new();
        let mut history: Vec<ContextItem> = Vec::new();
        for item in &node.node_data.data.metadata.context_items {
            if item.node_type == NodeType::SkillResponse {
                history.push(item.clone());
            } else {
                context.push(item.clone());
            }
        }

        let invocation = SkillInvocation {
            result_id: node.entity_id.clone(),
            query: node.processed_query.clone(),
            original_query: node.original_query.clone(),
            target_canvas_id: node.canvas_id.clone(),
            model: node.node_data.data.metadata.model.clone(),
            context,
            history,
            toolsets: node.node_data.data.metadata.toolsets.clone(),
            execution_id: node.execution_id.clone(),
            node_execution_id: node.node_execution_id.clone(),
        };

        log::info!(
            "Invoking skill for node {} of {} ({})",
            node.node_id,
            node.execution_id,
            node.entity_id
        );
        self.skill.invoke(&User::new(uid), invocation).await
    }
}
