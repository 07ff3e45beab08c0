// SPDX-License-Identifier: MIT

//! Infrastructure collaborators: persistence, queueing, locking, skill
//! invocation, and accounting. Every collaborator is a trait with an
//! in-memory implementation so the engine runs self-contained.

pub mod accounting;
pub mod lock;
pub mod queue;
pub mod skill;
pub mod store;

pub use accounting::{Accounting, CommissionRequest, InMemoryAccounting};
pub use lock::{InMemoryLockManager, LockManager, ReleaseFn};
pub use queue::{
    from_payload, to_payload, EnqueueOptions, InMemoryJobQueue, JobQueue, ReconcileJob,
    RunNodeJob, QUEUE_RECONCILE, QUEUE_RUN_NODE,
};
pub use skill::{SimulatedSkillInvoker, SkillInvocation, SkillInvoker, User};
pub use store::{
    ExecutionStore, ExecutionUpdate, InMemoryExecutionStore, NodeUpdate,
};
