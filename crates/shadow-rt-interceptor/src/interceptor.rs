//! Checkpoint listeners and the pipeline that fans checkpoints out to them.
//!
//! The host calls a listener synchronously at three checkpoints of every
//! tagged syntax site: on enter, on normal return with the produced value,
//! and on exceptional return.

use shadow_rt_core::{Host, Result, SyntaxSite};
use std::fmt;
use std::sync::Arc;

/// What a listener sees at a checkpoint.
pub struct EventContext<'a, H: Host> {
    pub site: &'a SyntaxSite<H>,
    pub frame: &'a Arc<H::Frame>,
}

impl<'a, H: Host> EventContext<'a, H> {
    pub fn new(site: &'a SyntaxSite<H>, frame: &'a Arc<H::Frame>) -> Self {
        Self { site, frame }
    }
}

impl<H: Host> Clone for EventContext<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H: Host> Copy for EventContext<'_, H> {}

/// Receives the checkpoints of tagged syntax sites.
pub trait ExecutionListener<H: Host>: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn on_enter(&self, context: EventContext<'_, H>) -> Result<()>;

    fn on_return_value(&self, context: EventContext<'_, H>, value: &H::Value) -> Result<()>;

    fn on_return_exceptional(
        &self,
        context: EventContext<'_, H>,
        exception: &dyn fmt::Debug,
    ) -> Result<()>;
}

/// Ordered listener pipeline.
///
/// Listeners run in registration order; the first error stops the
/// checkpoint and is returned to the host.
pub struct ListenerPipeline<H: Host> {
    listeners: Vec<Arc<dyn ExecutionListener<H>>>,
}

impl<H: Host> Default for ListenerPipeline<H> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<H: Host> Clone for ListenerPipeline<H> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<H: Host> ListenerPipeline<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener<H>>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn push(&mut self, listener: Arc<dyn ExecutionListener<H>>) {
        self.listeners.push(listener);
    }

    pub fn merge(&mut self, other: ListenerPipeline<H>) {
        self.listeners.extend(other.listeners);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.listeners.iter().map(|listener| listener.name()).collect()
    }

    fn run(
        &self,
        context: EventContext<'_, H>,
        checkpoint: &'static str,
        mut call: impl FnMut(&dyn ExecutionListener<H>) -> Result<()>,
    ) -> Result<()> {
        for listener in &self.listeners {
            if let Err(err) = call(listener.as_ref()) {
                tracing::warn!(
                    listener = listener.name(),
                    checkpoint,
                    site = %context.site.id(),
                    label = context.site.label(),
                    error = %err,
                    "Listener rejected checkpoint"
                );
                return Err(err);
            }
        }
        Ok(())
    }
}

impl<H: Host> ExecutionListener<H> for ListenerPipeline<H> {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn on_enter(&self, context: EventContext<'_, H>) -> Result<()> {
        self.run(context, "enter", |listener| listener.on_enter(context))
    }

    fn on_return_value(&self, context: EventContext<'_, H>, value: &H::Value) -> Result<()> {
        self.run(context, "return", |listener| {
            listener.on_return_value(context, value)
        })
    }

    fn on_return_exceptional(
        &self,
        context: EventContext<'_, H>,
        exception: &dyn fmt::Debug,
    ) -> Result<()> {
        self.run(context, "unwind", |listener| {
            listener.on_return_exceptional(context, exception)
        })
    }
}
