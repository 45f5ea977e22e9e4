//! Built-in listeners.

use crate::interceptor::{EventContext, ExecutionListener};
use shadow_rt_core::{Host, Result};
use std::fmt;

/// Logs every checkpoint at `trace` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl TracingListener {
    pub fn new() -> Self {
        Self
    }
}

impl<H: Host> ExecutionListener<H> for TracingListener {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn on_enter(&self, context: EventContext<'_, H>) -> Result<()> {
        tracing::trace!(
            site = %context.site.id(),
            label = context.site.label(),
            categories = %context.site.categories(),
            "enter"
        );
        Ok(())
    }

    fn on_return_value(&self, context: EventContext<'_, H>, value: &H::Value) -> Result<()> {
        tracing::trace!(
            site = %context.site.id(),
            label = context.site.label(),
            value = ?value,
            "return"
        );
        Ok(())
    }

    fn on_return_exceptional(
        &self,
        context: EventContext<'_, H>,
        exception: &dyn fmt::Debug,
    ) -> Result<()> {
        tracing::trace!(
            site = %context.site.id(),
            label = context.site.label(),
            exception = ?exception,
            "unwind"
        );
        Ok(())
    }
}
