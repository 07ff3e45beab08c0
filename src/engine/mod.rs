// SPDX-License-Identifier: MIT

//! Workflow execution engine
//!
//! The engine turns canvas graphs into executions: the compiler plans,
//! the service persists and seeds the queues, workers pull jobs into the
//! runner and the reconciler, and the abort controller ends executions
//! early. All state lives behind the `infra` collaborator traits.

pub mod abort;
pub mod compiler;
pub mod ids;
pub mod reconciler;
pub mod records;
pub mod runner;
pub mod service;
pub mod status;
pub mod variables;
pub mod worker;

pub use abort::AbortController;
pub use compiler::{compile_execution_plan, CompileRequest};
pub use ids::{IdGenerator, UuidIdGenerator};
pub use reconciler::Reconciler;
pub use records::{ExecutionPlan, NodeBehavior, NodeExecution, WorkflowExecution};
pub use runner::NodeRunner;
pub use service::{EngineConfig, ExecutionDetail, StartExecutionRequest, WorkflowEngine};
pub use status::{ExecutionStatus, NodeStatus};
pub use variables::substitute_variables;
pub use worker::Worker;
