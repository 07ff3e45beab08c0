//! Integration tests for canvas workflow execution
//!
//! These tests drive the full in-memory stack: engine, queues, runner,
//! reconciler, and the simulated skill layer.

use skein_rs::canvas::store::{CanvasStore, InMemoryCanvasStore};
use skein_rs::canvas::types::{
    CanvasData, CanvasEdge, CanvasNode, CanvasNodeData, CanvasNodeMetadata, NodeType,
};
use skein_rs::engine::abort::AbortController;
use skein_rs::engine::ids::UuidIdGenerator;
use skein_rs::engine::reconciler::Reconciler;
use skein_rs::engine::records::NodeBehavior;
use skein_rs::engine::runner::NodeRunner;
use skein_rs::engine::service::{EngineConfig, StartExecutionRequest, WorkflowEngine};
use skein_rs::engine::status::{ExecutionStatus, NodeStatus};
use skein_rs::engine::worker::Worker;
use skein_rs::infra::accounting::InMemoryAccounting;
use skein_rs::infra::lock::InMemoryLockManager;
use skein_rs::infra::queue::InMemoryJobQueue;
use skein_rs::infra::skill::{SimulatedSkillInvoker, User};
use skein_rs::infra::store::{ExecutionStore, InMemoryExecutionStore};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

static LOGGER: Lazy<()> = Lazy::new(|| {
    let _ = env_logger::builder().is_test(true).try_init();
});

// ============================================================================
// Fixture
// ============================================================================

struct Stack {
    canvas_store: Arc<InMemoryCanvasStore>,
    store: Arc<InMemoryExecutionStore>,
    engine: WorkflowEngine,
    abort: AbortController,
    worker: Arc<Worker>,
    accounting: Arc<InMemoryAccounting>,
}

fn build_stack(skill_delay: Duration) -> Stack {
    Lazy::force(&LOGGER);
    let config = EngineConfig::default()
        .with_reconcile_interval(Duration::from_millis(20))
        .with_worker_idle_sleep(Duration::from_millis(5));

    let canvas_store = Arc::new(InMemoryCanvasStore::new());
    let store = Arc::new(InMemoryExecutionStore::new());
    let queue = Arc::new(InMemoryJobQueue::new());
    let locks = Arc::new(InMemoryLockManager::new());
    let skill = Arc::new(SimulatedSkillInvoker::new(store.clone(), skill_delay));
    let accounting = Arc::new(InMemoryAccounting::new(10));

    let engine = WorkflowEngine::new(
        canvas_store.clone(),
        store.clone(),
        queue.clone(),
        Arc::new(UuidIdGenerator::new()),
    );
    let runner = Arc::new(NodeRunner::new(
        store.clone(),
        canvas_store.clone(),
        locks,
        skill.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        queue.clone(),
        accounting.clone(),
        config.clone(),
    ));
    let abort = AbortController::new(store.clone(), skill);
    let worker = Arc::new(Worker::new(queue, store.clone(), runner, reconciler, config));

    Stack {
        canvas_store,
        store,
        engine,
        abort,
        worker,
        accounting,
    }
}

fn make_node(id: &str, node_type: NodeType, query: Option<&str>) -> CanvasNode {
    CanvasNode {
        id: id.to_string(),
        node_type,
        data: CanvasNodeData {
            title: format!("{} title", id),
            entity_id: format!("{}-entity", id),
            metadata: CanvasNodeMetadata {
                query: query.map(|q| q.to_string()),
                ..Default::default()
            },
        },
    }
}

fn edge(source: &str, target: &str) -> CanvasEdge {
    CanvasEdge {
        source: source.to_string(),
        target: target.to_string(),
    }
}

/// skill -> skill -> document
fn linear_canvas() -> CanvasData {
    CanvasData {
        title: "linear".to_string(),
        nodes: vec![
            make_node("A", NodeType::SkillResponse, Some("research the topic")),
            make_node("B", NodeType::SkillResponse, Some("summarize findings")),
            make_node("C", NodeType::Document, None),
        ],
        edges: vec![edge("A", "B"), edge("B", "C")],
        variables: vec![],
    }
}

fn start_request(canvas_id: &str, behavior: NodeBehavior) -> StartExecutionRequest {
    StartExecutionRequest {
        canvas_id: canvas_id.to_string(),
        variables: vec![],
        start_nodes: vec![],
        node_behavior: behavior,
        app_id: None,
    }
}

// ============================================================================
// End-to-end flows
// ============================================================================

#[tokio::test]
async fn test_linear_canvas_runs_to_completion() {
    let stack = build_stack(Duration::from_millis(30));
    stack.canvas_store.insert("canvas-1", linear_canvas()).await;

    let execution = stack
        .engine
        .start_execution(
            &User::new("u-1"),
            start_request("canvas-1", NodeBehavior::Update),
        )
        .await
        .unwrap();

    stack.worker.drive(&execution.execution_id).await.unwrap();

    let finished = stack
        .store
        .get_execution(&execution.execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(finished.status, ExecutionStatus::Finish);
    assert_eq!(finished.executed_nodes, 3);
    assert_eq!(finished.failed_nodes, 0);
    assert_eq!(finished.total_nodes, 3);

    let nodes = stack.store.list_nodes(&execution.execution_id).await.unwrap();
    for node in &nodes {
        assert_eq!(node.status, NodeStatus::Finish, "node {}", node.node_id);
        assert_eq!(node.progress, 100);
        assert!(node.finished_at.is_some());
    }

    // Skill nodes carry claim timestamps, the pass-through document may not
    for node in nodes.iter().filter(|n| n.node_type == NodeType::SkillResponse) {
        assert!(node.started_at.is_some());
    }
}

#[tokio::test]
async fn test_clone_mode_builds_fresh_canvas_with_total_remap() {
    let stack = build_stack(Duration::from_millis(20));
    stack.canvas_store.insert("canvas-1", linear_canvas()).await;

    let execution = stack
        .engine
        .start_execution(
            &User::new("u-1"),
            start_request("canvas-1", NodeBehavior::Create),
        )
        .await
        .unwrap();

    assert_ne!(execution.canvas_id, "canvas-1");
    assert_eq!(execution.source_canvas_id, "canvas-1");

    stack.worker.drive(&execution.execution_id).await.unwrap();

    // Source canvas untouched, clone fully materialized
    let source = stack.canvas_store.get_canvas("canvas-1").await.unwrap();
    let clone = stack
        .canvas_store
        .get_canvas(&execution.canvas_id)
        .await
        .unwrap();
    assert_eq!(source.nodes.len(), 3);
    assert_eq!(clone.nodes.len(), 3);
    assert_eq!(clone.edges.len(), 2);

    let source_ids: HashSet<_> = source.nodes.iter().map(|n| n.id.clone()).collect();
    let source_entities: HashSet<_> =
        source.nodes.iter().map(|n| n.data.entity_id.clone()).collect();

    let nodes = stack.store.list_nodes(&execution.execution_id).await.unwrap();
    for node in &nodes {
        // Fresh identifiers everywhere, originals only in source_* fields
        assert!(!source_ids.contains(&node.node_id));
        assert!(!source_entities.contains(&node.entity_id));
        assert!(source_ids.contains(&node.source_node_id));
        assert!(source_entities.contains(&node.source_entity_id));
        assert_eq!(node.status, NodeStatus::Finish);
    }

    let fresh_ids: HashSet<_> = nodes.iter().map(|n| n.node_id.clone()).collect();
    for node in &nodes {
        for parent in &node.parent_node_ids {
            assert!(fresh_ids.contains(parent));
        }
        for child in &node.child_node_ids {
            assert!(fresh_ids.contains(child));
        }
    }
}

#[tokio::test]
async fn test_mid_flight_abort_fails_active_nodes() {
    // Skill work outlives the test unless aborted
    let stack = build_stack(Duration::from_secs(30));
    stack.canvas_store.insert("canvas-1", linear_canvas()).await;

    let execution = stack
        .engine
        .start_execution(
            &User::new("u-1"),
            start_request("canvas-1", NodeBehavior::Update),
        )
        .await
        .unwrap();

    // Tick until the first skill node has been claimed
    for _ in 0..50 {
        stack.worker.tick().await.unwrap();
        let node = stack
            .store
            .get_node(&execution.execution_id, "A")
            .await
            .unwrap()
            .unwrap();
        if node.status == NodeStatus::Executing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    stack
        .abort
        .abort(&User::new("u-1"), &execution.execution_id)
        .await
        .unwrap();

    let aborted = stack
        .store
        .get_execution(&execution.execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(aborted.status, ExecutionStatus::Failed);
    assert!(aborted.aborted_by_user);

    let nodes = stack.store.list_nodes(&execution.execution_id).await.unwrap();
    for node in &nodes {
        assert_eq!(node.status, NodeStatus::Failed, "node {}", node.node_id);
        assert_eq!(node.error_message.as_deref(), Some("Aborted by user"));
    }

    // A second abort of the same execution is a no-op
    stack
        .abort
        .abort(&User::new("u-1"), &execution.execution_id)
        .await
        .unwrap();

    // The cancelled skill task must not resurrect the node
    tokio::time::sleep(Duration::from_millis(100)).await;
    let node = stack
        .store
        .get_node(&execution.execution_id, "A")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.status, NodeStatus::Failed);
}

#[tokio::test]
async fn test_duplicate_reconcile_jobs_are_harmless() {
    let stack = build_stack(Duration::from_millis(20));
    stack.canvas_store.insert("canvas-1", linear_canvas()).await;

    let execution = stack
        .engine
        .start_execution(
            &User::new("u-1"),
            start_request("canvas-1", NodeBehavior::Update),
        )
        .await
        .unwrap();

    stack.worker.drive(&execution.execution_id).await.unwrap();

    // Extra passes over a terminal execution change nothing
    let before = stack
        .store
        .get_execution(&execution.execution_id)
        .await
        .unwrap()
        .unwrap();
    for _ in 0..3 {
        stack.worker.tick().await.unwrap();
    }
    let after = stack
        .store
        .get_execution(&execution.execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.status, after.status);
    assert_eq!(before.executed_nodes, after.executed_nodes);
    assert_eq!(after.executed_nodes, 3);
}

#[tokio::test]
async fn test_app_execution_settles_commission_once() {
    let stack = build_stack(Duration::from_millis(20));
    stack.canvas_store.insert("canvas-1", linear_canvas()).await;

    let mut request = start_request("canvas-1", NodeBehavior::Update);
    request.app_id = Some("app-1".to_string());
    let execution = stack
        .engine
        .start_execution(&User::new("u-1"), request)
        .await
        .unwrap();

    stack.worker.drive(&execution.execution_id).await.unwrap();

    let commissions = stack.accounting.recorded_commissions();
    assert_eq!(commissions.len(), 1);
    assert_eq!(commissions[0].app_id, "app-1");
    assert_eq!(commissions[0].payer_uid, "u-1");
    assert_eq!(commissions[0].execution_id, execution.execution_id);
}

#[tokio::test]
async fn test_two_workers_share_one_execution() {
    let stack = build_stack(Duration::from_millis(20));
    stack.canvas_store.insert("canvas-1", linear_canvas()).await;

    let execution = stack
        .engine
        .start_execution(
            &User::new("u-1"),
            start_request("canvas-1", NodeBehavior::Update),
        )
        .await
        .unwrap();

    // A second worker racing over the same queues
    let rival = stack.worker.clone();
    let execution_id = execution.execution_id.clone();
    let racer = tokio::spawn(async move {
        loop {
            rival.tick().await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    });

    stack.worker.drive(&execution.execution_id).await.unwrap();
    racer.abort();

    let finished = stack
        .store
        .get_execution(&execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(finished.status, ExecutionStatus::Finish);
    assert_eq!(finished.executed_nodes, 3);
    assert_eq!(finished.failed_nodes, 0);
}
