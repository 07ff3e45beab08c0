// SPDX-License-Identifier: MIT

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::canvas::types::WorkflowVariable;
use crate::engine::abort::AbortController;
use crate::engine::records::NodeBehavior;
use crate::engine::service::{StartExecutionRequest, WorkflowEngine};
use crate::infra::skill::User;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub abort: Arc<AbortController>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/executions", post(create_execution))
        .route("/api/executions/{id}", get(get_execution))
        .route("/api/executions/{id}/abort", post(abort_execution))
        .route("/api/executions/{id}/stream", get(stream_execution))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(
    state: AppState,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // TraceLayer reports through tracing; ignore a subscriber set elsewhere
    let _ = tracing_subscriber::fmt::try_init();

    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExecutionBody {
    uid: String,
    canvas_id: String,
    #[serde(default)]
    variables: Vec<WorkflowVariable>,
    #[serde(default)]
    start_nodes: Vec<String>,
    node_behavior: NodeBehavior,
    #[serde(default)]
    app_id: Option<String>,
}

async fn create_execution(
    State(state): State<AppState>,
    Json(body): Json<CreateExecutionBody>,
) -> Json<Value> {
    let request = StartExecutionRequest {
        canvas_id: body.canvas_id,
        variables: body.variables,
        start_nodes: body.start_nodes,
        node_behavior: body.node_behavior,
        app_id: body.app_id,
    };

    match state
        .engine
        .start_execution(&User::new(body.uid), request)
        .await
    {
        Ok(execution) => match serde_json::to_value(&execution) {
            Ok(value) => Json(value),
            Err(e) => Json(json!({"error": e.to_string()})),
        },
        Err(e) => Json(json!({"error": format!("Failed to start execution: {}", e)})),
    }
}

async fn get_execution(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    match state.engine.get_execution_detail(&id).await {
        Ok(detail) => match serde_json::to_value(&detail) {
            Ok(value) => Json(value),
            Err(e) => Json(json!({"error": e.to_string()})),
        },
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbortBody {
    uid: String,
}

async fn abort_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AbortBody>,
) -> Json<Value> {
    match state.abort.abort(&User::new(body.uid), &id).await {
        Ok(()) => Json(json!({ "status": "aborted" })),
        Err(e) => Json(json!({"error": format!("Abort failed: {}", e)})),
    }
}

async fn stream_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        log::info!("Streaming execution {}", id);
        loop {
            match state.engine.get_execution_detail(&id).await {
                Ok(detail) => {
                    let terminal = detail.execution.status.is_terminal();
                    if tx.send(json!(detail)).await.is_err() {
                        return;
                    }
                    if terminal {
                        return;
                    }
                }
                Err(e) => {
                    log::warn!("Stream lookup failed for {}: {}", id, e);
                    let _ = tx.send(json!({"error": e.to_string()})).await;
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    });

    let stream =
        ReceiverStream::new(rx).map(|snapshot| Ok(Event::default().json_data(snapshot).unwrap()));

    Sse::new(stream)
        .keep_alive(axum::response::sse::KeepAlive::new().interval(Duration::from_secs(1)))
}
