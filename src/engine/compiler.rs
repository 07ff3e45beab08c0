// SPDX-License-Identifier: MIT

//! Execution plan compiler
//!
//! Pure function turning a canvas graph plus resolved variables into the set
//! of node-execution create-records and the start-node frontier. No I/O: id
//! generation is injected, remap state is threaded as explicit maps.

use crate::canvas::types::{CanvasData, ConnectionFilter, NodeType, WorkflowVariable};
use crate::engine::ids::IdGenerator;
use crate::engine::records::{ExecutionPlan, NodeBehavior, NodeExecution};
use crate::engine::status::NodeStatus;
use crate::engine::variables::substitute_variables;
use std::collections::{HashMap, HashSet, VecDeque};

/// Compiler input
pub struct CompileRequest<'a> {
    pub execution_id: &'a str,
    /// Target canvas: the clone target in create mode, the source otherwise
    pub canvas_id: &'a str,
    pub canvas: &'a CanvasData,
    pub variables: &'a [WorkflowVariable],
    /// Caller-supplied frontier; ignored in create mode
    pub start_nodes: &'a [String],
    pub node_behavior: NodeBehavior,
}

/// Identifier remapping for clone mode. Empty in update mode, so lookups
/// fall through to the original ids.
#[derive(Debug, Default)]
struct IdRemap {
    nodes: HashMap<String, String>,
    entities: HashMap<String, String>,
}

impl IdRemap {
    fn node(&self, id: &str) -> String {
        self.nodes.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    fn entity(&self, id: &str) -> String {
        self.entities
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

/// Compile a canvas graph into an execution plan.
///
/// Deterministic given identical inputs and id-generator behavior; never
/// mutates its inputs. A graph with no determinable start nodes yields an
/// empty plan, which the caller treats as an immediately-finished execution.
pub fn compile_execution_plan(req: &CompileRequest, ids: &dyn IdGenerator) -> ExecutionPlan {
    let canvas = req.canvas;
    let known: HashSet<&str> = canvas.nodes.iter().map(|n| n.id.as_str()).collect();

    let mut parent_map: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut child_map: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &canvas.edges {
        // Edges referencing unknown node ids are ignored
        if !known.contains(edge.source.as_str()) || !known.contains(edge.target.as_str()) {
            continue;
        }
        child_map
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        parent_map
            .entry(edge.target.as_str())
            .or_default()
            .push(edge.source.as_str());
    }

    let start_nodes = determine_start_nodes(req, &known, &parent_map);
    if start_nodes.is_empty() {
        return ExecutionPlan::default();
    }

    let reachable = reachable_subtree(&start_nodes, &child_map);

    // Clone mode mints a fresh node id and a fresh type-namespaced entity id
    // for every node, in canvas order.
    let mut remap = IdRemap::default();
    if req.node_behavior == NodeBehavior::Create {
        for node in &canvas.nodes {
            remap.nodes.insert(node.id.clone(), ids.node_id());
            remap
                .entities
                .insert(node.data.entity_id.clone(), ids.entity_id(node.node_type));
        }
    }

    let mut node_executions = Vec::with_capacity(canvas.nodes.len());
    for node in &canvas.nodes {
        let node_id = remap.node(&node.id);
        let entity_id = remap.entity(&node.data.entity_id);

        let parent_node_ids: Vec<String> = parent_map
            .get(node.id.as_str())
            .map(|parents| parents.iter().map(|p| remap.node(p)).collect())
            .unwrap_or_default();
        let child_node_ids: Vec<String> = child_map
            .get(node.id.as_str())
            .map(|children| children.iter().map(|c| remap.node(c)).collect())
            .unwrap_or_default();

        let connect_to: Vec<ConnectionFilter> = parent_map
            .get(node.id.as_str())
            .map(|parents| {
                parents
                    .iter()
                    .filter_map(|p| canvas.node(p))
                    .map(|parent| {
                        ConnectionFilter::parent(
                            parent.node_type,
                            remap.entity(&parent.data.entity_id),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut snapshot = node.clone();
        snapshot.id = node_id.clone();
        snapshot.data.entity_id = entity_id.clone();
        if node.node_type == NodeType::SkillResponse {
            for item in &mut snapshot.data.metadata.context_items {
                item.entity_id = remap.entity(&item.entity_id);
            }
        }

        let original_query = node
            .data
            .metadata
            .query
            .clone()
            .unwrap_or_else(|| node.data.title.clone());
        let processed_query = substitute_variables(&original_query, req.variables);

        let status = if reachable.contains(node.id.as_str()) {
            NodeStatus::Waiting
        } else {
            // Outside the subtree: considered already satisfied
            NodeStatus::Finish
        };

        node_executions.push(NodeExecution {
            node_execution_id: ids.node_execution_id(),
            execution_id: req.execution_id.to_string(),
            canvas_id: req.canvas_id.to_string(),
            node_id,
            node_type: node.node_type,
            entity_id,
            node_data: snapshot,
            title: node.data.title.clone(),
            status,
            progress: if status == NodeStatus::Finish { 100 } else { 0 },
            processed_query,
            original_query,
            connect_to,
            parent_node_ids,
            child_node_ids,
            source_node_id: node.id.clone(),
            source_entity_id: node.data.entity_id.clone(),
            started_at: None,
            finished_at: None,
            error_message: None,
        });
    }

    let mut start_nodes: Vec<String> = start_nodes.iter().map(|s| remap.node(s)).collect();
    start_nodes.sort();

    ExecutionPlan {
        node_executions,
        start_nodes,
    }
}

/// Start-node determination. Clone mode always recomputes roots: a clone is
/// a fresh graph with no partial progress to resume from.
fn determine_start_nodes<'a>(
    req: &'a CompileRequest,
    known: &HashSet<&'a str>,
    parent_map: &HashMap<&'a str, Vec<&'a str>>,
) -> Vec<&'a str> {
    let roots = || -> Vec<&str> {
        req.canvas
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| !parent_map.contains_key(id))
            .collect()
    };

    if req.node_behavior == NodeBehavior::Create {
        return roots();
    }

    let supplied: Vec<&str> = req
        .start_nodes
        .iter()
        .map(|s| s.as_str())
        .filter(|id| known.contains(id))
        .collect();
    if supplied.is_empty() {
        roots()
    } else {
        supplied
    }
}

/// Breadth-first traversal over child edges from the start set
fn reachable_subtree<'a>(
    start_nodes: &[&'a str],
    child_map: &HashMap<&'a str, Vec<&'a str>>,
) -> HashSet<&'a str> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for start in start_nodes {
        if visited.insert(start) {
            queue.push_back(start);
        }
    }

    while let Some(current) = queue.pop_front() {
        if let Some(children) = child_map.get(current) {
            for child in children {
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
    }

    visited
}
