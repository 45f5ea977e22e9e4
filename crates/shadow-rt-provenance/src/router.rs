//! Per-category state transitions.
//!
//! The router is driven synchronously by the host at the enter, return and
//! unwind checkpoints of every tagged syntax site. Each category in the
//! site's set reads prior provenance from the shadow registry and pushes
//! the node it builds onto the current frame's shadow stack.

use crate::activation::ShadowActivationRecord;
use crate::dump::dump;
use crate::node::{Creator, NodeValue, ProvenanceNode};
use crate::registry::{SharedRecord, ShadowRegistry, lock};
use shadow_rt_core::{ArgumentCount, Category, Host, Result, ShadowError, SyntaxSite};
use shadow_rt_interceptor::{EventContext, ExecutionListener};
use std::fmt;
use std::sync::Arc;

pub struct EventRouter<H: Host> {
    host: Arc<H>,
    registry: Arc<ShadowRegistry<H>>,
    dump_on_write: bool,
}

impl<H: Host> EventRouter<H> {
    pub fn new(host: Arc<H>, registry: Arc<ShadowRegistry<H>>) -> Self {
        Self {
            host,
            registry,
            dump_on_write: false,
        }
    }

    /// Render the written tree at `trace` level after every local or
    /// class-variable write.
    pub fn with_dump_on_write(mut self, enabled: bool) -> Self {
        self.dump_on_write = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<ShadowRegistry<H>> {
        &self.registry
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn on_enter(&self, site: &SyntaxSite<H>, frame: &Arc<H::Frame>) -> Result<()> {
        tracing::trace!(site = %site.id(), label = site.label(), "router enter");
        for category in site.categories().iter() {
            match category {
                Category::FunctionBoundary => {
                    self.registry.attach_frame(frame)?;
                }
                category if category.marks_depth() => {
                    let record = self.registry.find_or_add_frame(frame)?;
                    lock(&record, "activation record")?.mark_depth(site.id());
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn on_return_value(
        &self,
        site: &SyntaxSite<H>,
        frame: &Arc<H::Frame>,
        value: &H::Value,
    ) -> Result<()> {
        tracing::trace!(site = %site.id(), label = site.label(), value = ?value, "router return");
        for category in site.categories().iter() {
            self.apply_return(category, site, frame, value)
                .map_err(|err| err.at_site(site.id()))?;
        }
        Ok(())
    }

    pub fn on_return_exceptional(
        &self,
        site: &SyntaxSite<H>,
        frame: &Arc<H::Frame>,
        exception: &dyn fmt::Debug,
    ) -> Result<()> {
        tracing::trace!(
            site = %site.id(),
            label = site.label(),
            exception = ?exception,
            "router unwind"
        );
        for category in site.categories().iter() {
            match category {
                Category::FunctionBoundary => {
                    tracing::debug!(
                        site = %site.id(),
                        label = site.label(),
                        exception = ?exception,
                        "Function unwound without a value"
                    );
                }
                Category::UseStackDefReturn => {
                    self.unwind_return(site, frame)
                        .map_err(|err| err.at_site(site.id()))?;
                }
                category if category.marks_depth() => {
                    if let Some(record) = self.registry.find_frame(frame)? {
                        lock(&record, "activation record")?.discard_depth_mark(site.id());
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply_return(
        &self,
        category: Category,
        site: &SyntaxSite<H>,
        frame: &Arc<H::Frame>,
        value: &H::Value,
    ) -> Result<()> {
        match category {
            Category::FunctionBoundary => self.propagate_to_caller(site, frame),
            Category::NoUseDefStack => {
                let node = self.node(site, value, Vec::new());
                self.with_record(frame, |record| {
                    record.push(node);
                    Ok(())
                })
            }
            Category::UseStackDefStack => self.with_record(frame, |record| {
                let origins = pop_since_mark(record, site)?;
                record.push(self.node(site, value, origins));
                Ok(())
            }),
            Category::UseLocalDefStack => {
                let local = site.local()?;
                self.with_record(frame, |record| {
                    let origin = record.current_of(local);
                    record.push(self.node(site, value, vec![origin]));
                    Ok(())
                })
            }
            Category::UseStackDefLocalStack => {
                let local = site.local()?;
                let node = self.with_record(frame, |record| {
                    let origin = record.pop()?;
                    let node = self.node(site, value, vec![origin]);
                    record.record_write(local, node.clone());
                    record.push(node.clone());
                    Ok(node)
                })?;
                self.dump_written(site, &node);
                Ok(())
            }
            Category::UseArgDefStack => self.bind_argument(site, frame, value),
            Category::UseStackDefPropertyStack => self.write_property(site, frame, value),
            Category::UsePropertyStackDefStack => self.read_property(site, frame, value),
            // Only the unwind path produces a node.
            Category::UseStackDefReturn => Ok(()),
            Category::UseClassVarDefStack => {
                let slot = site.class_var()?;
                let scope = self.registry.find_or_add_scope(&slot.scope)?;
                let origin = lock(&scope, "scope")?.read_or_default(&slot.name);
                let node = self.node(site, value, vec![origin]);
                self.with_record(frame, |record| {
                    record.push(node);
                    Ok(())
                })
            }
            Category::UseStackDefClassVar => {
                let slot = site.class_var()?;
                let node = self.with_record(frame, |record| {
                    let origin = record.pop()?;
                    Ok(self.node(site, value, vec![origin]))
                })?;
                let scope = self.registry.find_or_add_scope(&slot.scope)?;
                lock(&scope, "scope")?.write(&slot.name, node.clone());
                self.dump_written(site, &node);
                self.with_record(frame, |record| {
                    record.push(node);
                    Ok(())
                })
            }
            Category::UseGlobalDefStack => {
                let origin = self.registry.find_or_add_global(site.global()?)?;
                let node = self.node(site, value, vec![origin]);
                self.with_record(frame, |record| {
                    record.push(node);
                    Ok(())
                })
            }
            Category::UseStackDefGlobal => {
                let name = site.global()?;
                let node = self.with_record(frame, |record| {
                    let origin = record.pop()?;
                    Ok(self.node(site, value, vec![origin]))
                })?;
                self.registry.write_global(name, node.clone())?;
                self.with_record(frame, |record| {
                    record.push(node);
                    Ok(())
                })
            }
            Category::CallNode => {
                tracing::trace!(site = %site.id(), label = site.label(), "call node");
                Ok(())
            }
        }
    }

    /// Hand the callee's single result over to a traced caller.
    fn propagate_to_caller(&self, site: &SyntaxSite<H>, frame: &Arc<H::Frame>) -> Result<()> {
        let Some(caller) = self.host.caller_of(frame) else {
            return Ok(());
        };
        let Some(caller_record) = self.registry.find_frame(&caller)? else {
            tracing::debug!(site = %site.id(), label = site.label(), "Caller is not traced");
            return Ok(());
        };
        let Some(callee_record) = self.registry.find_frame(frame)? else {
            return Ok(());
        };
        let result = {
            let mut callee = lock(&callee_record, "activation record")?;
            if callee.depth() != 1 {
                tracing::debug!(
                    site = %site.id(),
                    label = site.label(),
                    depth = callee.depth(),
                    "Callee stack does not hold exactly one result"
                );
                return Ok(());
            }
            callee.pop()?
        };
        lock(&caller_record, "activation record")?.push(result);
        Ok(())
    }

    fn bind_argument(
        &self,
        site: &SyntaxSite<H>,
        frame: &Arc<H::Frame>,
        value: &H::Value,
    ) -> Result<()> {
        let slot = site.argument()?;
        let count = match slot.count {
            ArgumentCount::Declared(count) => count,
            ArgumentCount::FromFrame => self.host.argument_count(frame),
        };
        if matches!(slot.count, ArgumentCount::FromFrame) && slot.index >= count {
            tracing::debug!(
                site = %site.id(),
                label = site.label(),
                index = slot.index,
                count,
                "Argument index is past the frame's argument count"
            );
        }
        let caller_record = match self.host.caller_of(frame) {
            Some(caller) => self.registry.find_frame(&caller)?,
            None => None,
        };
        let origin = match caller_record {
            Some(record) => {
                let distance = count.saturating_sub(slot.index + 1);
                let caller = lock(&record, "activation record")?;
                caller.peek_at(distance)?.clone()
            }
            None => {
                tracing::debug!(
                    site = %site.id(),
                    label = site.label(),
                    index = slot.index,
                    "Argument bound from an untraced call site"
                );
                ProvenanceNode::unknown()
            }
        };
        let node = self.node(site, value, vec![origin]);
        self.with_record(frame, |record| {
            record.push(node);
            Ok(())
        })
    }

    fn write_property(
        &self,
        site: &SyntaxSite<H>,
        frame: &Arc<H::Frame>,
        value: &H::Value,
    ) -> Result<()> {
        let property = site.property()?;
        let node = self.with_record(frame, |record| {
            let origins = pop_since_mark(record, site)?;
            if origins.is_empty() {
                return Err(ShadowError::invalid_state(format!(
                    "{} ({}) assigned a property without a receiver on the stack",
                    site.id(),
                    site.label()
                )));
            }
            Ok(self.node(site, value, origins))
        })?;
        match self.receiver_of(&node.origins()[0]) {
            Some(object) => {
                let shadow = self.registry.find_or_add_object(&object)?;
                lock(&shadow, "object")?.write(property, node.clone());
            }
            None => {
                tracing::debug!(
                    site = %site.id(),
                    label = site.label(),
                    property = %property,
                    "Property write on a receiver that is not a known object"
                );
            }
        }
        self.with_record(frame, |record| {
            record.push(node);
            Ok(())
        })
    }

    fn read_property(
        &self,
        site: &SyntaxSite<H>,
        frame: &Arc<H::Frame>,
        value: &H::Value,
    ) -> Result<()> {
        let property = site.property()?;
        let mut origins = self.with_record(frame, |record| {
            let origins = pop_since_mark(record, site)?;
            if origins.is_empty() {
                return Err(ShadowError::invalid_state(format!(
                    "{} ({}) read a property without a receiver on the stack",
                    site.id(),
                    site.label()
                )));
            }
            Ok(origins)
        })?;
        let current = match self.receiver_of(&origins[0]) {
            Some(object) => {
                let shadow = self.registry.find_or_add_object(&object)?;
                lock(&shadow, "object")?.read_or_default(property)
            }
            None => {
                tracing::debug!(
                    site = %site.id(),
                    label = site.label(),
                    property = %property,
                    "Property read on a receiver that is not a known object"
                );
                ProvenanceNode::unknown()
            }
        };
        origins.push(current);
        let node = self.node(site, value, origins);
        self.with_record(frame, |record| {
            record.push(node);
            Ok(())
        })
    }

    /// A `return` unwinding out of its site: re-push the returned operand
    /// and remember it as the frame's return value.
    fn unwind_return(&self, site: &SyntaxSite<H>, frame: &Arc<H::Frame>) -> Result<()> {
        self.with_record(frame, |record| {
            let origin = record.pop()?;
            let node = ProvenanceNode::new(
                self.creator(site),
                origin.value().clone(),
                vec![origin],
            );
            record.push(node.clone());
            record.set_return_value(node);
            Ok(())
        })
    }

    fn receiver_of(&self, origin: &ProvenanceNode<H::Value>) -> Option<Arc<H::Object>> {
        origin
            .value()
            .known()
            .and_then(|value| self.host.object_of(value))
    }

    fn with_record<T>(
        &self,
        frame: &Arc<H::Frame>,
        apply: impl FnOnce(&mut ShadowActivationRecord<H::Value>) -> Result<T>,
    ) -> Result<T> {
        let record: SharedRecord<H::Value> = self.registry.find_or_add_frame(frame)?;
        let mut guard = lock(&record, "activation record")?;
        apply(&mut guard)
    }

    fn creator(&self, site: &SyntaxSite<H>) -> Creator {
        Creator::site(site.id(), site.shared_label())
    }

    fn node(
        &self,
        site: &SyntaxSite<H>,
        value: &H::Value,
        origins: Vec<ProvenanceNode<H::Value>>,
    ) -> ProvenanceNode<H::Value> {
        ProvenanceNode::new(self.creator(site), NodeValue::Known(value.clone()), origins)
    }

    fn dump_written(&self, site: &SyntaxSite<H>, node: &ProvenanceNode<H::Value>) {
        if self.dump_on_write {
            tracing::trace!(site = %site.id(), label = site.label(), tree = %dump(node), "Wrote shadow tree");
        }
    }
}

/// Pop everything pushed since `site` entered, most recent first.
fn pop_since_mark<H: Host>(
    record: &mut ShadowActivationRecord<H::Value>,
    site: &SyntaxSite<H>,
) -> Result<Vec<ProvenanceNode<H::Value>>> {
    let marked = record.take_depth_mark(site.id())?;
    let depth = record.depth();
    if depth < marked {
        return Err(ShadowError::invalid_state(format!(
            "{} ({}) returned with stack depth {} below its entry depth {}",
            site.id(),
            site.label(),
            depth,
            marked
        )));
    }
    record.pop_n(depth - marked)
}

impl<H: Host> ExecutionListener<H> for EventRouter<H> {
    fn name(&self) -> &'static str {
        "router"
    }

    fn on_enter(&self, context: EventContext<'_, H>) -> Result<()> {
        EventRouter::on_enter(self, context.site, context.frame)
    }

    fn on_return_value(&self, context: EventContext<'_, H>, value: &H::Value) -> Result<()> {
        EventRouter::on_return_value(self, context.site, context.frame, value)
    }

    fn on_return_exceptional(
        &self,
        context: EventContext<'_, H>,
        exception: &dyn fmt::Debug,
    ) -> Result<()> {
        EventRouter::on_return_exceptional(self, context.site, context.frame, exception)
    }
}
