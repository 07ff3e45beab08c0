// SPDX-License-Identifier: MIT

//! Skill invocation collaborator
//!
//! The skill subsystem performs the actual AI work for a node. Invocation is
//! fire-and-forget: completion is reported by the skill layer writing the
//! node record, which the reconciler observes on its next pass. This module
//! also ships `SimulatedSkillInvoker`, which stands in for the skill layer by
//! finishing nodes after a configurable delay, so the binary and the
//! integration tests run end-to-end without any provider.

use crate::canvas::types::{ContextItem, ModelSelection, ToolsetSelection};
use crate::engine::status::NodeStatus;
use crate::error::Result;
use crate::infra::store::{ExecutionStore, NodeUpdate};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Requesting/owning user identity threaded through collaborator calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: String,
}

impl User {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// AI invocation request built by the runner for a skill-response node
#[derive(Debug, Clone)]
pub struct SkillInvocation {
    /// The node's entity id; the skill layer keys its result by it
    pub result_id: String,
    pub query: String,
    pub original_query: String,
    pub target_canvas_id: String,
    pub model: Option<ModelSelection>,
    /// Non-AI cross-references attached to the node
    pub context: Vec<ContextItem>,
    /// Prior AI steps referenced by the node
    pub history: Vec<ContextItem>,
    pub toolsets: Vec<ToolsetSelection>,
    /// Execution linkage for downstream correlation
    pub execution_id: String,
    pub node_execution_id: String,
}

/// Skill subsystem contract
#[async_trait]
pub trait SkillInvoker: Send + Sync {
    /// Fire-and-forget: returns once the work is accepted, not done
    async fn invoke(&self, user: &User, invocation: SkillInvocation) -> Result<()>;

    /// Request cancellation of in-flight work; best-effort
    async fn abort(&self, user: &User, result_id: &str, reason: &str) -> Result<()>;
}

/// Simulated skill layer: completes each invoked node through the execution
/// store after a fixed delay. Cancellation aborts the pending completion.
pub struct SimulatedSkillInvoker {
    store: Arc<dyn ExecutionStore>,
    delay: Duration,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SimulatedSkillInvoker {
    pub fn new(store: Arc<dyn ExecutionStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SkillInvoker for SimulatedSkillInvoker {
    async fn invoke(&self, _user: &User, invocation: SkillInvocation) -> Result<()> {
        let store = Arc::clone(&self.store);
        let delay = self.delay;
        let execution_id = invocation.execution_id.clone();
        let node_execution_id = invocation.node_execution_id.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Completion is keyed by node-execution id; resolve it to the
            // node record and finish it if still executing.
            let nodes = match store.list_nodes(&execution_id).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    log::warn!("Simulated skill could not load nodes: {}", e);
                    return;
                }
            };
            let Some(node) = nodes
                .iter()
                .find(|n| n.node_execution_id == node_execution_id)
            else {
                log::warn!("Simulated skill found no node for {}", node_execution_id);
                return;
            };

            if let Err(e) = store
                .update_node_if(
                    &execution_id,
                    &node.node_id,
                    &[NodeStatus::Executing],
                    NodeUpdate::finished(Utc::now()),
                )
                .await
            {
                log::warn!("Simulated skill completion failed: {}", e);
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.insert(invocation.result_id, handle);
        Ok(())
    }

    async fn abort(&self, _user: &User, result_id: &str, reason: &str) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if let Some(handle) = tasks.remove(result_id) {
            log::info!("Cancelling simulated skill {}: {}", result_id, reason);
            handle.abort();
        }
        Ok(())
    }
}
