//! Backward slicing and graph snapshots.

use crate::node::{Creator, ProvenanceNode};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Every node that contributed to `node`, including `node` itself, each once,
/// oldest first.
pub fn backward_slice<V>(node: &ProvenanceNode<V>) -> Vec<ProvenanceNode<V>> {
    backward_slice_all(std::slice::from_ref(node))
}

/// Union of the backward slices of several roots, oldest first.
pub fn backward_slice_all<V>(roots: &[ProvenanceNode<V>]) -> Vec<ProvenanceNode<V>> {
    let mut seen = HashSet::new();
    let mut slice = Vec::new();
    let mut work: Vec<ProvenanceNode<V>> = roots.to_vec();
    while let Some(node) = work.pop() {
        if !seen.insert(node.seq()) {
            continue;
        }
        work.extend(node.origins().iter().cloned());
        slice.push(node);
    }
    slice.sort_by_key(ProvenanceNode::seq);
    slice
}

/// True when `ancestor` is reachable from `node` through origins.
pub fn depends_on<V>(node: &ProvenanceNode<V>, ancestor: &ProvenanceNode<V>) -> bool {
    backward_slice(node)
        .iter()
        .any(|candidate| ProvenanceNode::ptr_eq(candidate, ancestor))
}

/// Serializable snapshot of the graph reachable from a set of roots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvenanceGraph {
    pub roots: Vec<u64>,
    pub nodes: Vec<GraphNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<u64>,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub origins: Vec<u64>,
}

impl ProvenanceGraph {
    pub fn from_roots<V: fmt::Debug>(roots: &[ProvenanceNode<V>]) -> Self {
        let nodes = backward_slice_all(roots)
            .into_iter()
            .map(|node| GraphNode {
                seq: node.seq(),
                site: node.creator().site_id().map(|id| id.get()),
                label: match node.creator() {
                    Creator::Unknown => "<unknown>".to_string(),
                    Creator::Site { label, .. } => label.to_string(),
                },
                value: node.value().known().map(|value| format!("{:?}", value)),
                origins: node.origins().iter().map(ProvenanceNode::seq).collect(),
            })
            .collect();
        Self {
            roots: roots.iter().map(ProvenanceNode::seq).collect(),
            nodes,
        }
    }

    pub fn node(&self, seq: u64) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.seq == seq)
    }

    pub fn to_json(&self) -> shadow_rt_core::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
