//! Human-readable rendering of provenance trees.
//!
//! Diagnostic only. Nodes are numbered by first appearance within one
//! rendering, so output is stable across runs; a node reached a second time
//! is printed as a back-reference (`^[n]`) instead of being expanded again.

use crate::node::ProvenanceNode;
use std::collections::HashMap;
use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, Default)]
pub struct DumpOptions {
    /// Stop expanding origins below this depth (root is depth 0).
    pub max_depth: Option<usize>,
}

impl DumpOptions {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

pub fn dump<V: fmt::Debug>(node: &ProvenanceNode<V>) -> String {
    dump_with(node, DumpOptions::default())
}

pub fn dump_with<V: fmt::Debug>(node: &ProvenanceNode<V>, options: DumpOptions) -> String {
    let mut out = String::new();
    let mut seen: HashMap<u64, usize> = HashMap::new();
    // Explicit work list; deep chains must not exhaust the call stack.
    let mut work: Vec<(ProvenanceNode<V>, usize)> = vec![(node.clone(), 0)];

    while let Some((current, depth)) = work.pop() {
        let indent = "  ".repeat(depth);
        if let Some(ordinal) = seen.get(&current.seq()) {
            let _ = writeln!(out, "{}^[{}]", indent, ordinal);
            continue;
        }
        let ordinal = seen.len() + 1;
        seen.insert(current.seq(), ordinal);
        let _ = writeln!(
            out,
            "{}[{}] {} = {}",
            indent,
            ordinal,
            current.creator(),
            current.value()
        );

        let origins = current.origins();
        if origins.is_empty() {
            continue;
        }
        if options.max_depth.is_some_and(|max| depth >= max) {
            let _ = writeln!(out, "{}  ... {} origin(s)", indent, origins.len());
            continue;
        }
        for origin in origins.iter().rev() {
            work.push((origin.clone(), depth + 1));
        }
    }
    out
}
