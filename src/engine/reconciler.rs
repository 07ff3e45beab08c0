// SPDX-License-Identifier: MIT

//! Execution reconciler
//!
//! The reconciler is the engine's scheduler: each pass loads one snapshot of
//! an execution's node records and advances whatever that snapshot allows.
//! Passes are idempotent; a duplicated or stale pass enqueues nothing the
//! conditional updates and dedupe keys don't absorb.

use crate::engine::records::NodeBehavior;
use crate::engine::service::EngineConfig;
use crate::engine::status::{ExecutionStatus, NodeStatus};
use crate::error::Result;
use crate::infra::accounting::{Accounting, CommissionRequest};
use crate::infra::queue::{
    to_payload, EnqueueOptions, JobQueue, ReconcileJob, RunNodeJob, QUEUE_RECONCILE,
    QUEUE_RUN_NODE,
};
use crate::infra::store::{ExecutionStore, ExecutionUpdate, NodeUpdate};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Reconciler {
    store: Arc<dyn ExecutionStore>,
    queue: Arc<dyn JobQueue>,
    accounting: Arc<dyn Accounting>,
    config: EngineConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        queue: Arc<dyn JobQueue>,
        accounting: Arc<dyn Accounting>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            queue,
            accounting,
            config,
        }
    }

    /// One reconciliation pass over one execution
    pub async fn run_pass(&self, execution_id: &str) -> Result<()> {
        let Some(execution) = self.store.get_execution(execution_id).await? else {
            log::warn!("Reconcile job for unknown execution {}", execution_id);
            return Ok(());
        };
        if execution.status.is_terminal() {
            log::info!("Execution {} is terminal, pass is a no-op", execution_id);
            return Ok(());
        }

        let mut nodes = self.store.list_nodes(execution_id).await?;
        let status_by_id: HashMap<String, NodeStatus> = nodes
            .iter()
            .map(|n| (n.node_id.clone(), n.status))
            .collect();

        let parents_finished = |parent_ids: &[String]| {
            parent_ids
                .iter()
                .all(|p| status_by_id.get(p) == Some(&NodeStatus::Finish))
        };

        // Pass-through children of finished skill nodes complete without a
        // runner round-trip
        let finished_skills: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.node_type.executes_independently() && n.status == NodeStatus::Finish)
            .map(|(i, _)| i)
            .collect();
        let fast_forward: Vec<String> = finished_skills
            .iter()
            .flat_map(|&i| nodes[i].child_node_ids.clone())
            .filter(|child_id| {
                nodes.iter().any(|n| {
                    n.node_id == *child_id
                        && !n.node_type.executes_independently()
                        && !n.status.is_terminal()
                        && parents_finished(&n.parent_node_ids)
                })
            })
            .collect();
        for node_id in fast_forward {
            let advanced = self
                .store
                .update_node_if(
                    execution_id,
                    &node_id,
                    &[NodeStatus::Init, NodeStatus::Waiting],
                    NodeUpdate::finished(Utc::now()),
                )
                .await?;
            if advanced {
                log::info!(
                    "Fast-forwarded pass-through node {} of {}",
                    node_id,
                    execution_id
                );
                if let Some(node) = nodes.iter_mut().find(|n| n.node_id == node_id) {
                    node.status = NodeStatus::Finish;
                    node.progress = 100;
                }
            }
        }

        // Frontier: claimable skill nodes whose parents have all finished
        let finished_now: HashMap<&str, NodeStatus> = nodes
            .iter()
            .map(|n| (n.node_id.as_str(), n.status))
            .collect();
        let mut ready: Vec<&str> = nodes
            .iter()
            .filter(|n| {
                n.node_type.executes_independently()
                    && n.status.is_claimable()
                    && n.parent_node_ids
                        .iter()
                        .all(|p| finished_now.get(p.as_str()) == Some(&NodeStatus::Finish))
            })
            .map(|n| n.node_id.as_str())
            .collect();
        ready.sort();

        let behavior = if execution.canvas_id == execution.source_canvas_id {
            NodeBehavior::Update
        } else {
            NodeBehavior::Create
        };
        for node_id in ready {
            let job = RunNodeJob {
                execution_id: execution_id.to_string(),
                node_id: node_id.to_string(),
                node_behavior: behavior,
            };
            self.queue
                .enqueue(
                    QUEUE_RUN_NODE,
                    to_payload(&job)?,
                    EnqueueOptions {
                        dedupe_key: Some(job.dedupe_key()),
                        delay: None,
                    },
                )
                .await?;
        }

        // Aggregate recompute from the (locally advanced) snapshot
        let executed = nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Finish)
            .count() as u32;
        let failed = nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Failed)
            .count() as u32;
        let active = nodes.iter().filter(|n| n.status.is_active()).count();

        let new_status = if failed > 0 {
            ExecutionStatus::Failed
        } else if active == 0 {
            ExecutionStatus::Finish
        } else {
            ExecutionStatus::Executing
        };

        let applied = self
            .store
            .update_execution_if_active(
                execution_id,
                ExecutionUpdate {
                    status: Some(new_status),
                    executed_nodes: Some(executed),
                    failed_nodes: Some(failed),
                    aborted_by_user: None,
                },
            )
            .await?;

        if applied && new_status == ExecutionStatus::Finish {
            if let Some(app_id) = &execution.app_id {
                self.settle_commission(&execution.uid, execution_id, app_id)
                    .await;
            }
        }

        // Keep polling while the execution can still make progress
        if applied && !new_status.is_terminal() && active > 0 {
            let job = ReconcileJob {
                execution_id: execution_id.to_string(),
            };
            self.queue
                .enqueue(
                    QUEUE_RECONCILE,
                    to_payload(&job)?,
                    EnqueueOptions {
                        dedupe_key: Some(job.dedupe_key()),
                        delay: Some(self.config.reconcile_interval),
                    },
                )
                .await?;
        }

        Ok(())
    }

    /// Accounting is best-effort: failures are logged and never surface
    async fn settle_commission(&self, uid: &str, execution_id: &str, app_id: &str) {
        let amount = match self.accounting.tally_credit_usage(uid, execution_id).await {
            Ok(amount) => amount,
            Err(e) => {
                log::error!("Credit tally failed for {}: {}", execution_id, e);
                return;
            }
        };
        let request = CommissionRequest {
            payer_uid: uid.to_string(),
            execution_id: execution_id.to_string(),
            amount,
            app_id: app_id.to_string(),
        };
        if let Err(e) = self.accounting.record_commission(request).await {
            log::error!("Commission record failed for {}: {}", execution_id, e);
        }
    }
}
