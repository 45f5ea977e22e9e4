//! Dynamic provenance capture.
//!
//! This crate holds the provenance graph model, the shadow state that mirrors
//! a host interpreter's frames and heap, and the router that updates that
//! state from the host's checkpoints.

pub mod activation;
pub mod dump;
pub mod heap;
pub mod node;
pub mod registry;
pub mod router;
pub mod slice;
mod weak_table;

pub use activation::ShadowActivationRecord;
pub use dump::{DumpOptions, dump, dump_with};
pub use heap::{ShadowHeapObject, ShadowObject, ShadowScope};
pub use node::{Creator, NodeValue, ProvenanceNode};
pub use registry::{
    RegistryStats, ShadowRegistry, SharedObject, SharedRecord, SharedScope, SweepReport,
};
pub use router::EventRouter;
pub use slice::{GraphNode, ProvenanceGraph, backward_slice, backward_slice_all, depends_on};
