use clap::{Parser, Subcommand};
use dotenv::dotenv;
use skein_rs::canvas::loader::CanvasLoader;
use skein_rs::canvas::store::InMemoryCanvasStore;
use skein_rs::engine::abort::AbortController;
use skein_rs::engine::records::NodeBehavior;
use skein_rs::engine::reconciler::Reconciler;
use skein_rs::engine::runner::NodeRunner;
use skein_rs::engine::service::{EngineConfig, StartExecutionRequest, WorkflowEngine};
use skein_rs::engine::worker::Worker;
use skein_rs::engine::ids::UuidIdGenerator;
use skein_rs::infra::accounting::InMemoryAccounting;
use skein_rs::infra::lock::InMemoryLockManager;
use skein_rs::infra::queue::InMemoryJobQueue;
use skein_rs::infra::skill::{SimulatedSkillInvoker, User};
use skein_rs::infra::store::{ExecutionStore, InMemoryExecutionStore};
use skein_rs::server::{self, AppState};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a canvas file and print the result
    Run {
        /// Path to the canvas file (YAML or JSON)
        #[arg(short, long)]
        file: String,

        /// Execution variant: "update" runs in place, "create" clones first
        #[arg(short, long, default_value = "update")]
        behavior: String,

        /// Acting user id
        #[arg(short, long, default_value = "local-user")]
        uid: String,
    },
    /// Serve the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Canvas files to preload, keyed by file stem
        #[arg(short, long)]
        canvas: Vec<String>,
    },
}

struct Stack {
    canvas_store: Arc<InMemoryCanvasStore>,
    store: Arc<InMemoryExecutionStore>,
    engine: Arc<WorkflowEngine>,
    abort: Arc<AbortController>,
    worker: Arc<Worker>,
}

fn build_stack(config: EngineConfig) -> Stack {
    let canvas_store = Arc::new(InMemoryCanvasStore::new());
    let store = Arc::new(InMemoryExecutionStore::new());
    let queue = Arc::new(InMemoryJobQueue::new());
    let locks = Arc::new(InMemoryLockManager::new());
    let skill = Arc::new(SimulatedSkillInvoker::new(
        store.clone(),
        Duration::from_millis(500),
    ));
    let accounting = Arc::new(InMemoryAccounting::default());
    let ids = Arc::new(UuidIdGenerator::new());

    let engine = Arc::new(WorkflowEngine::new(
        canvas_store.clone(),
        store.clone(),
        queue.clone(),
        ids,
    ));
    let runner = Arc::new(NodeRunner::new(
        store.clone(),
        canvas_store.clone(),
        locks,
        skill.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        queue.clone(),
        accounting,
        config.clone(),
    ));
    let abort = Arc::new(AbortController::new(store.clone(), skill));
    let worker = Arc::new(Worker::new(queue, store.clone(), runner, reconciler, config));

    Stack {
        canvas_store,
        store,
        engine,
        abort,
        worker,
    }
}

fn canvas_key(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("canvas")
        .to_string()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            file,
            behavior,
            uid,
        } => {
            let behavior = match behavior.as_str() {
                "create" => NodeBehavior::Create,
                _ => NodeBehavior::Update,
            };

            // Fast polling so a local run finishes promptly
            let config = EngineConfig::default()
                .with_reconcile_interval(Duration::from_millis(200))
                .with_worker_idle_sleep(Duration::from_millis(20));
            let stack = build_stack(config);

            let loader = CanvasLoader::new();
            let canvas = loader.load_canvas(&file)?;
            let canvas_id = canvas_key(&file);
            println!("Executing canvas: {} ({} nodes)", canvas.title, canvas.nodes.len());
            stack.canvas_store.insert(canvas_id.clone(), canvas).await;

            let execution = stack
                .engine
                .start_execution(
                    &User::new(uid),
                    StartExecutionRequest {
                        canvas_id,
                        variables: vec![],
                        start_nodes: vec![],
                        node_behavior: behavior,
                        app_id: None,
                    },
                )
                .await?;

            stack.worker.drive(&execution.execution_id).await?;

            let finished = stack
                .store
                .get_execution(&execution.execution_id)
                .await?
                .ok_or("execution record vanished")?;
            println!(
                "Execution {} finished: {:?} ({} ok, {} failed of {})",
                finished.execution_id,
                finished.status,
                finished.executed_nodes,
                finished.failed_nodes,
                finished.total_nodes
            );

            let nodes = stack.store.list_nodes(&execution.execution_id).await?;
            for node in nodes {
                println!(
                    "  {:<24} {:<14} {:?} {}",
                    node.node_id,
                    format!("{:?}", node.node_type),
                    node.status,
                    node.error_message.unwrap_or_default()
                );
            }
        }
        Commands::Serve { port, canvas } => {
            let stack = build_stack(EngineConfig::default());

            let loader = CanvasLoader::new();
            for file in canvas {
                let key = canvas_key(&file);
                match loader.load_canvas(&file) {
                    Ok(data) => {
                        log::info!("Preloaded canvas {} from {}", key, file);
                        stack.canvas_store.insert(key, data).await;
                    }
                    Err(e) => log::warn!("Failed to load canvas {}: {}", file, e),
                }
            }

            let worker = stack.worker.clone();
            tokio::spawn(async move {
                if let Err(e) = worker.run().await {
                    log::error!("Worker loop exited: {}", e);
                }
            });

            let state = AppState {
                engine: stack.engine,
                abort: stack.abort,
            };
            server::serve(state, port).await?;
        }
    }

    Ok(())
}
