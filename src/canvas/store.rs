// SPDX-License-Identifier: MIT

//! Canvas store collaborator
//!
//! The canvas store is the source of truth for canvas graphs. The engine
//! consumes it through the `CanvasStore` trait; `InMemoryCanvasStore` backs
//! the binary and the tests.

use super::types::{
    CanvasData, CanvasEdge, CanvasNode, ConnectionFilter, HandleType, WorkflowVariable,
};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Request to create a fresh canvas (clone-mode target)
#[derive(Debug, Clone)]
pub struct CreateCanvasRequest {
    pub canvas_id: String,
    pub title: String,
    pub variables: Vec<WorkflowVariable>,
    pub visible: bool,
}

/// Field patch for one canvas node, merged into the node's metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDiff {
    pub node_id: String,
    pub set: Value,
}

/// Edge addition/removal for a canvas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDiff {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub remove: bool,
}

/// A node to add to a canvas together with its parent attachments
#[derive(Debug, Clone)]
pub struct NodeWithConnections {
    pub node: CanvasNode,
    pub connect_to: Vec<ConnectionFilter>,
}

/// Canvas graph store contract consumed by the engine
#[async_trait]
pub trait CanvasStore: Send + Sync {
    /// Fetch the full graph for a canvas
    async fn get_canvas(&self, canvas_id: &str) -> Result<CanvasData>;

    /// Create a fresh canvas
    async fn create_canvas(&self, req: CreateCanvasRequest) -> Result<()>;

    /// Replace the canvas variable set, returning the resolved variables
    async fn set_variables(
        &self,
        canvas_id: &str,
        variables: Vec<WorkflowVariable>,
    ) -> Result<Vec<WorkflowVariable>>;

    /// Apply node/edge mutations to a canvas
    async fn apply_diff(
        &self,
        canvas_id: &str,
        node_diffs: Vec<NodeDiff>,
        edge_diffs: Vec<EdgeDiff>,
    ) -> Result<()>;

    /// Add nodes to a canvas, splicing edges from their connection filters
    async fn add_nodes(&self, canvas_id: &str, nodes: Vec<NodeWithConnections>) -> Result<()>;
}

/// In-memory canvas store used by tests and the bundled binary
#[derive(Clone, Default)]
pub struct InMemoryCanvasStore {
    canvases: Arc<RwLock<HashMap<String, CanvasData>>>,
}

impl InMemoryCanvasStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a canvas directly, bypassing `create_canvas`
    pub async fn insert(&self, canvas_id: impl Into<String>, canvas: CanvasData) {
        let mut canvases = self.canvases.write().await;
        canvases.insert(canvas_id.into(), canvas);
    }
}

#[async_trait]
impl CanvasStore for InMemoryCanvasStore {
    async fn get_canvas(&self, canvas_id: &str) -> Result<CanvasData> {
        let canvases = self.canvases.read().await;
        canvases
            .get(canvas_id)
            .cloned()
            .ok_or_else(|| EngineError::CanvasNotFound(canvas_id.to_string()))
    }

    async fn create_canvas(&self, req: CreateCanvasRequest) -> Result<()> {
        let mut canvases = self.canvases.write().await;
        canvases.insert(
            req.canvas_id,
            CanvasData {
                title: req.title,
                nodes: vec![],
                edges: vec![],
                variables: req.variables,
            },
        );
        Ok(())
    }

    async fn set_variables(
        &self,
        canvas_id: &str,
        variables: Vec<WorkflowVariable>,
    ) -> Result<Vec<WorkflowVariable>> {
        let mut canvases = self.canvases.write().await;
        let canvas = canvases
            .get_mut(canvas_id)
            .ok_or_else(|| EngineError::CanvasNotFound(canvas_id.to_string()))?;
        canvas.variables = variables;
        Ok(canvas.variables.clone())
    }

    async fn apply_diff(
        &self,
        canvas_id: &str,
        node_diffs: Vec<NodeDiff>,
        edge_diffs: Vec<EdgeDiff>,
    ) -> Result<()> {
        let mut canvases = self.canvases.write().await;
        let canvas = canvases
            .get_mut(canvas_id)
            .ok_or_else(|| EngineError::CanvasNotFound(canvas_id.to_string()))?;

        for diff in node_diffs {
            if let Some(node) = canvas.nodes.iter_mut().find(|n| n.id == diff.node_id) {
                if let Value::Object(fields) = diff.set {
                    for (key, value) in fields {
                        node.data.metadata.extra.insert(key, value);
                    }
                }
            }
        }

        for diff in edge_diffs {
            if diff.remove {
                canvas
                    .edges
                    .retain(|e| !(e.source == diff.source && e.target == diff.target));
            } else {
                canvas.edges.push(CanvasEdge {
                    source: diff.source,
                    target: diff.target,
                });
            }
        }

        Ok(())
    }

    async fn add_nodes(&self, canvas_id: &str, nodes: Vec<NodeWithConnections>) -> Result<()> {
        let mut canvases = self.canvases.write().await;
        let canvas = canvases
            .get_mut(canvas_id)
            .ok_or_else(|| EngineError::CanvasNotFound(canvas_id.to_string()))?;

        for entry in nodes {
            for filter in &entry.connect_to {
                if filter.handle_type != HandleType::Source {
                    continue;
                }
                // Parent filters address nodes by entity id
                if let Some(parent) = canvas
                    .nodes
                    .iter()
                    .find(|n| n.data.entity_id == filter.entity_id)
                {
                    canvas.edges.push(CanvasEdge {
                        source: parent.id.clone(),
                        target: entry.node.id.clone(),
                    });
                }
            }
            canvas.nodes.push(entry.node);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::types::{CanvasNodeData, CanvasNodeMetadata, NodeType};
    use serde_json::json;

    fn make_node(id: &str, entity_id: &str, node_type: NodeType) -> CanvasNode {
        CanvasNode {
            id: id.to_string(),
            node_type,
            data: CanvasNodeData {
                title: id.to_string(),
                entity_id: entity_id.to_string(),
                metadata: CanvasNodeMetadata::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_get_missing_canvas_is_error() {
        let store = InMemoryCanvasStore::new();
        assert!(store.get_canvas("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_create_and_get_canvas() {
        let store = InMemoryCanvasStore::new();
        store
            .create_canvas(CreateCanvasRequest {
                canvas_id: "c1".to_string(),
                title: "Clone".to_string(),
                variables: vec![],
                visible: false,
            })
            .await
            .unwrap();

        let canvas = store.get_canvas("c1").await.unwrap();
        assert_eq!(canvas.title, "Clone");
        assert!(canvas.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_apply_node_diff_merges_metadata() {
        let store = InMemoryCanvasStore::new();
        store
            .insert(
                "c1",
                CanvasData {
                    title: "t".to_string(),
                    nodes: vec![make_node("n1", "sr-1", NodeType::SkillResponse)],
                    edges: vec![],
                    variables: vec![],
                },
            )
            .await;

        store
            .apply_diff(
                "c1",
                vec![NodeDiff {
                    node_id: "n1".to_string(),
                    set: json!({"status": "executing"}),
                }],
                vec![],
            )
            .await
            .unwrap();

        let canvas = store.get_canvas("c1").await.unwrap();
        assert_eq!(
            canvas.nodes[0].data.metadata.extra.get("status").unwrap(),
            &json!("executing")
        );
    }

    #[tokio::test]
    async fn test_add_nodes_splices_edges_from_filters() {
        let store = InMemoryCanvasStore::new();
        store
            .insert(
                "c1",
                CanvasData {
                    title: "t".to_string(),
                    nodes: vec![make_node("n1", "sr-1", NodeType::SkillResponse)],
                    edges: vec![],
                    variables: vec![],
                },
            )
            .await;

        store
            .add_nodes(
                "c1",
                vec![NodeWithConnections {
                    node: make_node("n2", "doc-1", NodeType::Document),
                    connect_to: vec![ConnectionFilter::parent(NodeType::SkillResponse, "sr-1")],
                }],
            )
            .await
            .unwrap();

        let canvas = store.get_canvas("c1").await.unwrap();
        assert_eq!(canvas.nodes.len(), 2);
        assert_eq!(canvas.edges.len(), 1);
        assert_eq!(canvas.edges[0].source, "n1");
        assert_eq!(canvas.edges[0].target, "n2");
    }

    #[tokio::test]
    async fn test_set_variables_returns_resolved() {
        let store = InMemoryCanvasStore::new();
        store.insert("c1", CanvasData::default()).await;

        let resolved = store
            .set_variables(
                "c1",
                vec![WorkflowVariable {
                    name: "topic".to_string(),
                    variable_type: crate::canvas::types::VariableType::String,
                    values: vec![crate::canvas::types::VariableValue::text("rust")],
                }],
            )
            .await
            .unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "topic");
    }
}
