// SPDX-License-Identifier: MIT

//! Identifier generation
//!
//! The compiler never calls `uuid` directly: it takes an `IdGenerator` so
//! clone-mode remapping stays a pure function with reproducible ids in tests.

use crate::canvas::types::NodeType;
use uuid::Uuid;

/// Generates the ids the engine mints: executions, node executions, canvas
/// nodes, and type-namespaced entity ids.
pub trait IdGenerator: Send + Sync {
    fn execution_id(&self) -> String;
    fn node_execution_id(&self) -> String;
    fn canvas_id(&self) -> String;
    fn node_id(&self) -> String;
    /// Entity id generation is type-aware: each node type has its own
    /// id namespace
    fn entity_id(&self, node_type: NodeType) -> String;
}

/// UUID v4 generator with type-specific prefixes
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl UuidIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for UuidIdGenerator {
    fn execution_id(&self) -> String {
        format!("we-{}", Uuid::new_v4())
    }

    fn node_execution_id(&self) -> String {
        format!("wne-{}", Uuid::new_v4())
    }

    fn canvas_id(&self) -> String {
        format!("canvas-{}", Uuid::new_v4())
    }

    fn node_id(&self) -> String {
        format!("node-{}", Uuid::new_v4())
    }

    fn entity_id(&self, node_type: NodeType) -> String {
        let prefix = match node_type {
            NodeType::SkillResponse => "sr",
            NodeType::Document => "doc",
            NodeType::Resource => "res",
            NodeType::Tool => "tl",
            NodeType::CodeArtifact => "art",
            NodeType::Memo => "memo",
        };
        format!("{}-{}", prefix, Uuid::new_v4())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic generator yielding N1, N2, ... and E1, E2, ...
    #[derive(Debug, Default)]
    pub struct SequentialIdGenerator {
        nodes: AtomicUsize,
        entities: AtomicUsize,
        others: AtomicUsize,
    }

    impl SequentialIdGenerator {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn execution_id(&self) -> String {
            format!("X{}", self.others.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn node_execution_id(&self) -> String {
            format!("R{}", self.others.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn canvas_id(&self) -> String {
            format!("C{}", self.others.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn node_id(&self) -> String {
            format!("N{}", self.nodes.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn entity_id(&self, _node_type: NodeType) -> String {
            format!("E{}", self.entities.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }
}
