//! Node and edge collections with the acyclicity and single-selection
//! invariants.
//!
//! Every mutating method validates first and mutates last, so a rejected
//! call leaves the store exactly as it was.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use branchat_llm::ModelSelection;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::{CanvasError, Result};
use crate::types::{Edge, Node, NodeId, Position};

/// Store handle shared between the orchestrator and running sessions
pub type SharedStore = Arc<Mutex<GraphStore>>;

#[derive(Debug, Default)]
pub struct GraphStore {
    /// Insertion order is kept; layout results depend on it
    nodes: IndexMap<NodeId, Node>,
    /// Insertion order is kept; `inputs_of` reports in it
    edges: Vec<Edge>,
    outgoing: HashMap<NodeId, Vec<NodeId>>,
    selected: Option<NodeId>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn add_node(&mut self, mut node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(CanvasError::DuplicateId(node.id));
        }

        // The flag is owned by `select`
        node.selected = false;
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Remove a node together with every edge that references it
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        let node = self
            .nodes
            .shift_remove(id)
            .ok_or_else(|| CanvasError::UnknownNode(id.to_string()))?;

        self.edges.retain(|e| e.source != id && e.target != id);
        self.outgoing.remove(id);
        for targets in self.outgoing.values_mut() {
            targets.retain(|t| t != id);
        }

        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }

        Ok(node)
    }

    /// Append `source -> target`, rejecting unknown endpoints and cycles.
    ///
    /// Adding an edge that already exists is a no-op.
    pub fn add_edge(&mut self, source: &str, target: &str) -> Result<Edge> {
        for endpoint in [source, target] {
            if !self.nodes.contains_key(endpoint) {
                return Err(CanvasError::UnknownEndpoint(endpoint.to_string()));
            }
        }

        if source == target || self.reaches(target, source) {
            return Err(CanvasError::CycleDetected {
                source_id: source.to_string(),
                target_id: target.to_string(),
            });
        }

        let edge = Edge::new(source, target);
        if self.edges.iter().any(|e| e.id == edge.id) {
            return Ok(edge);
        }

        self.outgoing
            .entry(source.to_string())
            .or_default()
            .push(target.to_string());
        self.edges.push(edge.clone());
        Ok(edge)
    }

    /// Depth-first walk along outgoing edges with an explicit stack
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(targets) = self.outgoing.get(current) {
                stack.extend(
                    targets
                        .iter()
                        .map(String::as_str)
                        .filter(|t| !visited.contains(t)),
                );
            }
        }

        false
    }

    /// Nodes with an edge into `id`, in edge-insertion order
    pub fn inputs_of(&self, id: &str) -> Vec<&Node> {
        self.edges
            .iter()
            .filter(|e| e.target == id)
            .filter_map(|e| self.nodes.get(&e.source))
            .collect()
    }

    /// Select one node, or clear the selection with `None`
    pub fn select(&mut self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            if !self.nodes.contains_key(id) {
                return Err(CanvasError::UnknownNode(id.to_string()));
            }
        }

        if let Some(previous) = self.selected.take() {
            if let Some(node) = self.nodes.get_mut(&previous) {
                node.selected = false;
            }
        }

        if let Some(id) = id {
            if let Some(node) = self.nodes.get_mut(id) {
                node.selected = true;
            }
            self.selected = Some(id.to_string());
        }

        Ok(())
    }

    pub fn selected(&self) -> Option<&NodeId> {
        self.selected.as_ref()
    }

    pub fn update_model(&mut self, id: &str, model: ModelSelection) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| CanvasError::UnknownNode(id.to_string()))?;
        node.model = Some(model);
        Ok(())
    }

    /// Fill the question of a blank card
    pub(crate) fn set_question(&mut self, id: &str, question: &str, model: ModelSelection) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| CanvasError::UnknownNode(id.to_string()))?;
        if !node.is_blank() {
            return Err(CanvasError::NotBlank(id.to_string()));
        }
        node.content = question.to_string();
        node.model = Some(model);
        Ok(())
    }

    /// Overwrite the answer fields; sessions are the only writers
    pub(crate) fn set_response(&mut self, id: &str, response: &str, error: bool) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.response.clear();
                node.response.push_str(response);
                node.error = error;
                true
            }
            None => false,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn positions(&self) -> Vec<Position> {
        self.nodes.values().map(|n| n.position).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
