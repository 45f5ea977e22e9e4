//! Host interpreter boundary.
//!
//! The shadow runtime never looks inside the host's frames, objects or
//! values. Everything it needs is expressed by this trait plus the per-site
//! capability records in [`crate::site`].

use std::fmt;
use std::sync::Arc;

/// Contract an embedding interpreter implements to be traced.
///
/// Frames, heap objects and lexical scopes are shared through `Arc`; their
/// allocation identity is their key in the shadow registry, and the registry
/// only ever holds weak references to them.
pub trait Host: Send + Sync + 'static {
    /// One activation of a function or block.
    type Frame: ?Sized + Send + Sync + 'static;
    /// A heap object that can carry instance properties.
    type Object: ?Sized + Send + Sync + 'static;
    /// A lexical or class scope that owns class variables.
    type Scope: ?Sized + Send + Sync + 'static;
    /// A runtime value as produced by a syntax node.
    type Value: Clone + fmt::Debug + Send + Sync + 'static;

    /// The frame that called `frame`, or `None` at the bottom of the stack.
    fn caller_of(&self, frame: &Arc<Self::Frame>) -> Option<Arc<Self::Frame>>;

    /// Number of actual arguments passed into `frame`.
    ///
    /// Hosts whose argument vectors carry extra hidden slots must report only
    /// the user-visible arguments here.
    fn argument_count(&self, frame: &Arc<Self::Frame>) -> usize;

    /// The heap object a value refers to, if it refers to one.
    fn object_of(&self, value: &Self::Value) -> Option<Arc<Self::Object>>;
}
