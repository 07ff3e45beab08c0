// SPDX-License-Identifier: MIT

//! Canvas schema types
//!
//! This module contains the data structures describing a canvas: the
//! user-authored directed graph of nodes and edges that a workflow execution
//! is compiled from, plus the workflow variable set attached to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node type tag carried by every canvas node.
///
/// This is a closed set: the runner and reconciler dispatch on it with
/// exhaustive matches, so adding a type is a compile-time-checked exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    /// AI response node - the only type with an independent execution step
    SkillResponse,
    Document,
    Resource,
    Tool,
    CodeArtifact,
    Memo,
}

impl NodeType {
    /// Whether this node type carries its own execution step.
    ///
    /// All other types are pass-through: they are satisfied as soon as
    /// their generating dependency completes.
    pub fn executes_independently(&self) -> bool {
        matches!(self, NodeType::SkillResponse)
    }
}

/// One vertex of a canvas graph
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasNode {
    /// Unique node identifier within the canvas
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub data: CanvasNodeData,
}

/// Payload of a canvas node
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasNodeData {
    pub title: String,
    /// Business object the node refers to (document id, result id, ...)
    pub entity_id: String,
    #[serde(default)]
    pub metadata: CanvasNodeMetadata,
}

/// Type-specific node metadata
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasNodeMetadata {
    /// Original query text for AI nodes; falls back to the node title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Cross-references this node carries into its AI invocation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_items: Vec<ContextItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSelection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub toolsets: Vec<ToolsetSelection>,
    /// Unmodeled metadata is preserved verbatim in node snapshots
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A cross-reference attached to an AI node
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Model choice for an AI node
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSelection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Toolset choice for an AI node
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsetSelection {
    pub toolset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Handle side of a connection filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleType {
    Source,
    Target,
}

/// How a node attaches to one of its parents in the target canvas.
///
/// Used to splice a node into a canvas's edge set: the parent is addressed
/// by entity id rather than node id so the filter survives cloning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionFilter {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub entity_id: String,
    pub handle_type: HandleType,
}

impl ConnectionFilter {
    /// Filter pointing at a parent node's source handle
    pub fn parent(node_type: NodeType, entity_id: impl Into<String>) -> Self {
        Self {
            node_type,
            entity_id: entity_id.into(),
            handle_type: HandleType::Source,
        }
    }
}

/// One directed edge of a canvas graph
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasEdge {
    pub source: String,
    pub target: String,
}

/// Workflow variable type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableType {
    String,
    Option,
    /// Resource variables are injected out-of-band by the skill layer and
    /// never substituted into query text
    Resource,
}

/// A named workflow variable with its typed values
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowVariable {
    pub name: String,
    #[serde(rename = "variableType")]
    pub variable_type: VariableType,
    #[serde(default)]
    pub values: Vec<VariableValue>,
}

/// One value of a workflow variable
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableValue {
    #[serde(rename = "type")]
    pub value_type: VariableValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceRef>,
}

impl VariableValue {
    /// Build a plain text value
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            value_type: VariableValueType::Text,
            text: Some(text.into()),
            resource: None,
        }
    }
}

/// Kind tag of a variable value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableValueType {
    Text,
    Resource,
}

/// A resource reference carried by a resource-typed variable value
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A full canvas graph as returned by the canvas store
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub nodes: Vec<CanvasNode>,
    #[serde(default)]
    pub edges: Vec<CanvasEdge>,
    #[serde(default)]
    pub variables: Vec<WorkflowVariable>,
}

impl CanvasData {
    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&CanvasNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
