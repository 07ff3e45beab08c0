// SPDX-License-Identifier: MIT

//! Queue worker
//!
//! Pulls from both queues and dispatches to the runner and the reconciler.
//! Job failures are logged and dropped; retry policy belongs to the queue
//! layer, not here.

use crate::engine::reconciler::Reconciler;
use crate::engine::runner::NodeRunner;
use crate::engine::service::EngineConfig;
use crate::error::Result;
use crate::infra::queue::{from_payload, JobQueue, ReconcileJob, RunNodeJob, QUEUE_RECONCILE, QUEUE_RUN_NODE};
use crate::infra::store::ExecutionStore;
use std::sync::Arc;

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn ExecutionStore>,
    runner: Arc<NodeRunner>,
    reconciler: Arc<Reconciler>,
    config: EngineConfig,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn ExecutionStore>,
        runner: Arc<NodeRunner>,
        reconciler: Arc<Reconciler>,
        config: EngineConfig,
    ) -> Self {
        Self {
            queue,
            store,
            runner,
            reconciler,
            config,
        }
    }

    /// Process at most one job from each queue. Returns whether any job ran.
    pub async fn tick(&self) -> Result<bool> {
        let mut worked = false;

        if let Some(payload) = self.queue.dequeue(QUEUE_RUN_NODE).await? {
            worked = true;
            match from_payload::<RunNodeJob>(payload) {
                Ok(job) => {
                    if let Err(e) = self.runner.run_node(&job.execution_id, &job.node_id).await {
                        log::error!(
                            "Run-node job failed for {} of {}: {}",
                            job.node_id,
                            job.execution_id,
                            e
                        );
                    }
                }
                Err(e) => log::error!("Malformed run-node payload: {}", e),
            }
        }

        if let Some(payload) = self.queue.dequeue(QUEUE_RECONCILE).await? {
            worked = true;
            match from_payload::<ReconcileJob>(payload) {
                Ok(job) => {
                    if let Err(e) = self.reconciler.run_pass(&job.execution_id).await {
                        log::error!("Reconcile job failed for {}: {}", job.execution_id, e);
                    }
                }
                Err(e) => log::error!("Malformed reconcile payload: {}", e),
            }
        }

        Ok(worked)
    }

    /// Poll both queues forever
    pub async fn run(&self) -> Result<()> {
        loop {
            if !self.tick().await? {
                tokio::time::sleep(self.config.worker_idle_sleep).await;
            }
        }
    }

    /// Process jobs until the given execution is terminal and both queues
    /// have drained. Used by the CLI and the integration tests.
    pub async fn drive(&self, execution_id: &str) -> Result<()> {
        loop {
            let worked = self.tick().await?;

            let terminal = self
                .store
                .get_execution(execution_id)
                .await?
                .map(|e| e.status.is_terminal())
                .unwrap_or(true);
            if terminal && !worked {
                // One more sweep for stragglers, then stop
                if !self.tick().await? {
                    return Ok(());
                }
                continue;
            }

            if !worked {
                tokio::time::sleep(self.config.worker_idle_sleep).await;
            }
        }
    }
}
