//! Instrumentation sessions
//!
//! A session owns the shadow registry for one run of the host and the
//! listener pipeline the host reports checkpoints to. Dropping the session
//! drops every shadow entity it created.

use serde::Serialize;
use shadow_rt_core::{Host, Result, SessionId, SourceFilter, SyntaxSite, TracerConfig};
use shadow_rt_interceptor::{EventContext, ExecutionListener, ListenerPipeline, TracingListener};
use shadow_rt_provenance::{EventRouter, RegistryStats, ShadowRegistry, SweepReport};
use std::fmt;
use std::sync::Arc;

/// What a session left behind when it finished.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session: String,
    pub swept: SweepReport,
    pub stats: RegistryStats,
}

/// Built tracing session
pub struct TracingSession<H: Host> {
    id: SessionId,
    config: TracerConfig,
    registry: Arc<ShadowRegistry<H>>,
    router: Arc<EventRouter<H>>,
    pipeline: ListenerPipeline<H>,
}

impl<H: Host> TracingSession<H> {
    pub fn builder(host: Arc<H>) -> TracingSessionBuilder<H> {
        TracingSessionBuilder::new(host)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Which sources the host should tag.
    pub fn source_filter(&self) -> &SourceFilter {
        &self.config.source_filter
    }

    pub fn registry(&self) -> &Arc<ShadowRegistry<H>> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<EventRouter<H>> {
        &self.router
    }

    /// Names of the listeners in dispatch order.
    pub fn listeners(&self) -> Vec<&'static str> {
        self.pipeline.names()
    }

    pub fn enter(&self, site: &SyntaxSite<H>, frame: &Arc<H::Frame>) -> Result<()> {
        self.in_site_span(site, "enter", || {
            self.pipeline.on_enter(EventContext::new(site, frame))
        })
    }

    pub fn return_value(
        &self,
        site: &SyntaxSite<H>,
        frame: &Arc<H::Frame>,
        value: &H::Value,
    ) -> Result<()> {
        self.in_site_span(site, "return", || {
            self.pipeline
                .on_return_value(EventContext::new(site, frame), value)
        })
    }

    pub fn return_exceptional(
        &self,
        site: &SyntaxSite<H>,
        frame: &Arc<H::Frame>,
        exception: &dyn fmt::Debug,
    ) -> Result<()> {
        self.in_site_span(site, "unwind", || {
            self.pipeline
                .on_return_exceptional(EventContext::new(site, frame), exception)
        })
    }

    /// Sweep dead entries and report what is left.
    pub fn finish(self) -> Result<SessionSummary> {
        let swept = self.registry.sweep()?;
        let stats = self.registry.stats()?;
        tracing::info!(
            session = %self.id,
            swept = swept.total(),
            frames = stats.frames,
            objects = stats.objects,
            scopes = stats.scopes,
            globals = stats.globals,
            "Tracing session finished"
        );
        Ok(SessionSummary {
            session: self.id.to_string(),
            swept,
            stats,
        })
    }

    fn in_site_span<T>(
        &self,
        site: &SyntaxSite<H>,
        checkpoint: &'static str,
        run: impl FnOnce() -> T,
    ) -> T {
        #[cfg(feature = "observability")]
        {
            shadow_rt_observability::site_span(site, checkpoint).in_scope(run)
        }
        #[cfg(not(feature = "observability"))]
        {
            let _ = (site, checkpoint);
            run()
        }
    }
}

impl<H: Host> ExecutionListener<H> for TracingSession<H> {
    fn name(&self) -> &'static str {
        "session"
    }

    fn on_enter(&self, context: EventContext<'_, H>) -> Result<()> {
        self.enter(context.site, context.frame)
    }

    fn on_return_value(&self, context: EventContext<'_, H>, value: &H::Value) -> Result<()> {
        self.return_value(context.site, context.frame, value)
    }

    fn on_return_exceptional(
        &self,
        context: EventContext<'_, H>,
        exception: &dyn fmt::Debug,
    ) -> Result<()> {
        self.return_exceptional(context.site, context.frame, exception)
    }
}

/// Builder for constructing a tracing session
pub struct TracingSessionBuilder<H: Host> {
    host: Arc<H>,
    config: TracerConfig,
    listeners: ListenerPipeline<H>,
    log_checkpoints: bool,
}

impl<H: Host> TracingSessionBuilder<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            host,
            config: TracerConfig::default(),
            listeners: ListenerPipeline::new(),
            log_checkpoints: false,
        }
    }

    pub fn with_config(mut self, config: TracerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run `listener` after the router at every checkpoint.
    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener<H>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Log every checkpoint through a [`TracingListener`] ahead of the router.
    pub fn with_checkpoint_logging(mut self, enabled: bool) -> Self {
        self.log_checkpoints = enabled;
        self
    }

    pub fn build(self) -> TracingSession<H> {
        let id = SessionId::generate();
        let registry = Arc::new(ShadowRegistry::new(&self.config));
        let router = Arc::new(
            EventRouter::new(self.host, Arc::clone(&registry))
                .with_dump_on_write(self.config.dump_on_write),
        );

        let mut pipeline = ListenerPipeline::new();
        if self.log_checkpoints {
            pipeline.push(Arc::new(TracingListener::new()));
        }
        pipeline.push(router.clone());
        pipeline.merge(self.listeners);

        tracing::info!(
            session = %id,
            sweep_interval = self.config.sweep_interval,
            listeners = ?pipeline.names(),
            "Tracing session started"
        );

        TracingSession {
            id,
            config: self.config,
            registry,
            router,
            pipeline,
        }
    }
}
