// SPDX-License-Identifier: MIT

//! User-initiated abort
//!
//! Aborting is terminal and ownership-checked. In-flight skill work is
//! cancelled best-effort; node records fail in bulk, sparing anything
//! already terminal, and the aggregate flips to failed under the same
//! guard the reconciler uses, so a racing finish wins cleanly.

use crate::engine::status::NodeStatus;
use crate::error::{EngineError, Result};
use crate::infra::skill::{SkillInvoker, User};
use crate::infra::store::{ExecutionStore, ExecutionUpdate};
use chrono::Utc;
use std::sync::Arc;

const ABORT_MESSAGE: &str = "Aborted by user";

pub struct AbortController {
    store: Arc<dyn ExecutionStore>,
    skill: Arc<dyn SkillInvoker>,
}

impl AbortController {
    pub fn new(store: Arc<dyn ExecutionStore>, skill: Arc<dyn SkillInvoker>) -> Self {
        Self { store, skill }
    }

    /// Abort an execution on behalf of its owner
    pub async fn abort(&self, user: &User, execution_id: &str) -> Result<()> {
        let execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        if execution.uid != user.uid {
            return Err(EngineError::NotOwner {
                uid: user.uid.clone(),
                execution_id: execution_id.to_string(),
            });
        }
        if execution.status.is_terminal() {
            log::info!(
                "Abort of {} ignored, execution already {:?}",
                execution_id,
                execution.status
            );
            return Ok(());
        }

        // Cancel whatever the skill layer still has in flight. Individual
        // cancellation failures must not stop the abort.
        let nodes = self.store.list_nodes(execution_id).await?;
        for node in nodes
            .iter()
            .filter(|n| n.node_type.executes_independently() && n.status == NodeStatus::Executing)
        {
            if let Err(e) = self
                .skill
                .abort(user, &node.entity_id, ABORT_MESSAGE)
                .await
            {
                log::warn!(
                    "Skill cancel failed for node {} of {}: {}",
                    node.node_id,
                    execution_id,
                    e
                );
            }
        }

        let failed = self
            .store
            .fail_active_nodes(execution_id, ABORT_MESSAGE, Utc::now())
            .await?;
        log::info!("Aborted {} active nodes of {}", failed, execution_id);

        self.store
            .update_execution_if_active(
                execution_id,
                ExecutionUpdate {
                    status: Some(crate::engine::status::ExecutionStatus::Failed),
                    executed_nodes: None,
                    failed_nodes: None,
                    aborted_by_user: Some(true),
                },
            )
            .await?;
        Ok(())
    }
}
