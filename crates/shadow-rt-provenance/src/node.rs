//! Provenance nodes.
//!
//! A node is immutable once built and is compared by identity. Its origins
//! can only be nodes that already exist, so the graph is acyclic by
//! construction; the sequence number makes that order observable.

use shadow_rt_core::SiteId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NODE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_seq() -> u64 {
    NODE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// The construct that produced a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Creator {
    Unknown,
    Site { id: SiteId, label: Arc<str> },
}

impl Creator {
    pub fn site(id: SiteId, label: Arc<str>) -> Self {
        Creator::Site { id, label }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Creator::Unknown)
    }

    pub fn site_id(&self) -> Option<SiteId> {
        match self {
            Creator::Unknown => None,
            Creator::Site { id, .. } => Some(*id),
        }
    }
}

impl fmt::Display for Creator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Creator::Unknown => f.write_str("<unknown>"),
            Creator::Site { id, label } => write!(f, "{} {}", id, label),
        }
    }
}

/// Snapshot of the value a node stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue<V> {
    Unknown,
    Known(V),
}

impl<V> NodeValue<V> {
    pub fn is_unknown(&self) -> bool {
        matches!(self, NodeValue::Unknown)
    }

    pub fn known(&self) -> Option<&V> {
        match self {
            NodeValue::Unknown => None,
            NodeValue::Known(value) => Some(value),
        }
    }
}

impl<V: fmt::Debug> fmt::Display for NodeValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Unknown => f.write_str("<unknown>"),
            NodeValue::Known(value) => write!(f, "{:?}", value),
        }
    }
}

struct NodeInner<V> {
    seq: u64,
    creator: Creator,
    value: NodeValue<V>,
    origins: Vec<ProvenanceNode<V>>,
}

// Long chains (a loop rewriting one local) would otherwise free their
// origins one stack frame per link.
impl<V> Drop for NodeInner<V> {
    fn drop(&mut self) {
        let mut work = std::mem::take(&mut self.origins);
        while let Some(node) = work.pop() {
            if let Ok(mut inner) = Arc::try_unwrap(node.inner) {
                work.append(&mut inner.origins);
            }
        }
    }
}

/// One node of the provenance graph. Cloning shares the node.
pub struct ProvenanceNode<V> {
    inner: Arc<NodeInner<V>>,
}

impl<V> ProvenanceNode<V> {
    pub fn new(creator: Creator, value: NodeValue<V>, origins: Vec<ProvenanceNode<V>>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                seq: next_seq(),
                creator,
                value,
                origins,
            }),
        }
    }

    /// A node whose creator and value are both unknown and which has no origins.
    pub fn unknown() -> Self {
        Self::new(Creator::Unknown, NodeValue::Unknown, Vec::new())
    }

    pub fn seq(&self) -> u64 {
        self.inner.seq
    }

    pub fn creator(&self) -> &Creator {
        &self.inner.creator
    }

    pub fn value(&self) -> &NodeValue<V> {
        &self.inner.value
    }

    pub fn origins(&self) -> &[ProvenanceNode<V>] {
        &self.inner.origins
    }

    /// Both creator and value are the UNKNOWN sentinels.
    pub fn is_unknown(&self) -> bool {
        self.inner.creator.is_unknown() && self.inner.value.is_unknown()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<V> Clone for ProvenanceNode<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> PartialEq for ProvenanceNode<V> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<V> Eq for ProvenanceNode<V> {}

impl<V: fmt::Debug> fmt::Debug for ProvenanceNode<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origins: Vec<u64> = self.origins().iter().map(ProvenanceNode::seq).collect();
        f.debug_struct("ProvenanceNode")
            .field("seq", &self.seq())
            .field("creator", self.creator())
            .field("value", self.value())
            .field("origins", &origins)
            .finish()
    }
}
