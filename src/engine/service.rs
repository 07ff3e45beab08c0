// SPDX-License-Identifier: MIT

//! Workflow engine entry point
//!
//! `WorkflowEngine::start_execution` is the only way an execution comes into
//! being: it loads the canvas, materializes the clone target when asked,
//! compiles the plan, persists the records, and seeds both queues. After
//! that the workers own the execution.

use crate::canvas::store::{CanvasStore, CreateCanvasRequest, NodeWithConnections};
use crate::canvas::types::WorkflowVariable;
use crate::engine::compiler::{compile_execution_plan, CompileRequest};
use crate::engine::ids::IdGenerator;
use crate::engine::records::{NodeBehavior, WorkflowExecution};
use crate::engine::status::ExecutionStatus;
use crate::error::{EngineError, Result};
use crate::infra::queue::{
    to_payload, EnqueueOptions, JobQueue, ReconcileJob, RunNodeJob, QUEUE_RECONCILE,
    QUEUE_RUN_NODE,
};
use crate::infra::skill::User;
use crate::infra::store::ExecutionStore;
use std::sync::Arc;
use std::time::Duration;

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between reconciliation passes of one execution
    pub reconcile_interval: Duration,
    /// Worker sleep when both queues are empty
    pub worker_idle_sleep: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_millis(1500),
            worker_idle_sleep: Duration::from_millis(100),
        }
    }
}

impl EngineConfig {
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    pub fn with_worker_idle_sleep(mut self, sleep: Duration) -> Self {
        self.worker_idle_sleep = sleep;
        self
    }
}

/// Request to start executing a canvas
#[derive(Debug, Clone)]
pub struct StartExecutionRequest {
    pub canvas_id: String,
    pub variables: Vec<WorkflowVariable>,
    /// Caller-chosen frontier; ignored in create mode
    pub start_nodes: Vec<String>,
    pub node_behavior: NodeBehavior,
    /// Owning application, when launched from a published app
    pub app_id: Option<String>,
}

/// Execution with its node records, as served to clients
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetail {
    pub execution: WorkflowExecution,
    pub nodes: Vec<crate::engine::records::NodeExecution>,
}

pub struct WorkflowEngine {
    canvas_store: Arc<dyn CanvasStore>,
    store: Arc<dyn ExecutionStore>,
    queue: Arc<dyn JobQueue>,
    ids: Arc<dyn IdGenerator>,
}

impl WorkflowEngine {
    pub fn new(
        canvas_store: Arc<dyn CanvasStore>,
        store: Arc<dyn ExecutionStore>,
        queue: Arc<dyn JobQueue>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            canvas_store,
            store,
            queue,
            ids,
        }
    }

    /// Start a workflow execution and return its initial record
    pub async fn start_execution(
        &self,
        user: &User,
        req: StartExecutionRequest,
    ) -> Result<WorkflowExecution> {
        let canvas = self.canvas_store.get_canvas(&req.canvas_id).await?;
        let execution_id = self.ids.execution_id();

        // Clone mode runs against a fresh, initially hidden canvas
        let target_canvas_id = if req.node_behavior == NodeBehavior::Create {
            let target = self.ids.canvas_id();
            self.canvas_store
                .create_canvas(CreateCanvasRequest {
                    canvas_id: target.clone(),
                    title: canvas.title.clone(),
                    variables: req.variables.clone(),
                    visible: false,
                })
                .await?;
            target
        } else {
            req.canvas_id.clone()
        };

        let resolved = self
            .canvas_store
            .set_variables(&target_canvas_id, req.variables)
            .await?;

        let plan = compile_execution_plan(
            &CompileRequest {
                execution_id: &execution_id,
                canvas_id: &target_canvas_id,
                canvas: &canvas,
                variables: &resolved,
                start_nodes: &req.start_nodes,
                node_behavior: req.node_behavior,
            },
            self.ids.as_ref(),
        );

        let mut execution = WorkflowExecution {
            execution_id: execution_id.clone(),
            uid: user.uid.clone(),
            canvas_id: target_canvas_id.clone(),
            source_canvas_id: req.canvas_id.clone(),
            variables: resolved,
            title: canvas.title.clone(),
            status: ExecutionStatus::Executing,
            total_nodes: plan.node_executions.len() as u32,
            executed_nodes: 0,
            failed_nodes: 0,
            app_id: req.app_id,
            aborted_by_user: false,
        };

        // Nothing to run: the execution is born finished
        if plan.is_empty() {
            log::info!(
                "Canvas {} compiled to an empty plan, finishing {} immediately",
                req.canvas_id,
                execution_id
            );
            execution.status = ExecutionStatus::Finish;
            self.store.create_execution(execution.clone()).await?;
            return Ok(execution);
        }

        if req.node_behavior == NodeBehavior::Create {
            let materialized: Vec<NodeWithConnections> = plan
                .node_executions
                .iter()
                .map(|record| NodeWithConnections {
                    node: record.node_data.clone(),
                    connect_to: record.connect_to.clone(),
                })
                .collect();
            self.canvas_store
                .add_nodes(&target_canvas_id, materialized)
                .await?;
        }

        self.store.create_execution(execution.clone()).await?;
        self.store
            .create_node_executions(plan.node_executions.clone())
            .await?;

        for node_id in &plan.start_nodes {
            let job = RunNodeJob {
                execution_id: execution_id.clone(),
                node_id: node_id.clone(),
                node_behavior: req.node_behavior,
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

        let reconcile = ReconcileJob {
            execution_id: execution_id.clone(),
        };
        self.queue
            .enqueue(
                QUEUE_RECONCILE,
                to_payload(&reconcile)?,
                EnqueueOptions {
                    dedupe_key: Some(reconcile.dedupe_key()),
                    delay: None,
                },
            )
            .await?;

        log::info!(
            "Started execution {} over canvas {} ({} nodes, {} start)",
            execution_id,
            req.canvas_id,
            execution.total_nodes,
            plan.start_nodes.len()
        );
        Ok(execution)
    }

    /// Fetch an execution together with its node records
    pub async fn get_execution_detail(&self, execution_id: &str) -> Result<ExecutionDetail> {
        let execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        let nodes = self.store.list_nodes(execution_id).await?;
        Ok(ExecutionDetail { execution, nodes })
    }
}
