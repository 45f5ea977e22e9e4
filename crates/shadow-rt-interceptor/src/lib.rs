//! Execution listener interfaces and implementations.

pub mod interceptor;
pub mod interceptors;

pub use interceptor::{EventContext, ExecutionListener, ListenerPipeline};
pub use interceptors::TracingListener;
