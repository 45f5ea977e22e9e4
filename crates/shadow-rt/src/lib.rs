//! Dynamic provenance tracking for tree-walking interpreters
//!
//! This crate ties the shadow registry, the event router and the listener
//! pipeline together into one [`TracingSession`] per instrumentation run.

pub mod session;

pub use session::{SessionSummary, TracingSession, TracingSessionBuilder};

pub use shadow_rt_interceptor as interceptor;
pub use shadow_rt_provenance as provenance;

#[cfg(feature = "observability")]
pub use shadow_rt_observability as observability;

pub use shadow_rt_core::{
    ArgumentCount, Category, CategorySet, ClassVarName, GlobalName, Host, LocalId, PropertyName,
    Result, SessionId, ShadowError, SiteId, SourceFilter, SyntaxSite, TracerConfig,
};
pub use shadow_rt_interceptor::{ExecutionListener, ListenerPipeline, TracingListener};
pub use shadow_rt_provenance::{EventRouter, ProvenanceNode, ShadowRegistry, dump};
