//! Per-object shadow state.
//!
//! Unlike locals, slots here keep only the latest provenance.

use crate::node::ProvenanceNode;
use shadow_rt_core::{ClassVarName, PropertyName};
use std::collections::HashMap;
use std::hash::Hash;

/// Latest provenance of each slot of one heap entity.
pub struct ShadowHeapObject<K, V> {
    slots: HashMap<K, ProvenanceNode<V>>,
}

/// Instance properties of a heap object.
pub type ShadowObject<V> = ShadowHeapObject<PropertyName, V>;

/// Class or lexical-scope variables of a scope object.
pub type ShadowScope<V> = ShadowHeapObject<ClassVarName, V>;

impl<K, V> Default for ShadowHeapObject<K, V> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> ShadowHeapObject<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, id: &K) -> Option<ProvenanceNode<V>> {
        self.slots.get(id).cloned()
    }

    /// Latest provenance, storing an UNKNOWN node the first time a slot is read.
    pub fn read_or_default(&mut self, id: &K) -> ProvenanceNode<V> {
        self.slots
            .entry(id.clone())
            .or_insert_with(ProvenanceNode::unknown)
            .clone()
    }

    pub fn write(&mut self, id: &K, node: ProvenanceNode<V>) {
        self.slots.insert(id.clone(), node);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
