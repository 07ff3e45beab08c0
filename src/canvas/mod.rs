// SPDX-License-Identifier: MIT

//! Canvas domain - graph schema, file loading, and the canvas store contract

pub mod loader;
pub mod store;
pub mod types;

pub use loader::CanvasLoader;
pub use store::{
    CanvasStore, CreateCanvasRequest, EdgeDiff, InMemoryCanvasStore, NodeDiff, NodeWithConnections,
};
pub use types::{
    CanvasData, CanvasEdge, CanvasNode, CanvasNodeData, CanvasNodeMetadata, ConnectionFilter,
    ContextItem, HandleType, ModelSelection, NodeType, ToolsetSelection, VariableType,
    VariableValue, VariableValueType, WorkflowVariable,
};
