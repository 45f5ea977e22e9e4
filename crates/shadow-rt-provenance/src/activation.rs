//! Per-frame shadow state.

use crate::node::ProvenanceNode;
use shadow_rt_core::{LocalId, Result, ShadowError, SiteId, SiteLabel};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DepthMark {
    site: SiteId,
    depth: usize,
}

/// Shadow of one host call frame.
///
/// The operand stack mirrors the host's stack depth at every tagged node.
/// Local histories are append-only; the last entry is the current value.
pub struct ShadowActivationRecord<V> {
    stack: Vec<ProvenanceNode<V>>,
    locals: HashMap<LocalId, Vec<ProvenanceNode<V>>>,
    return_value: Option<ProvenanceNode<V>>,
    invocation_arg_count: Option<usize>,
    depth_marks: Vec<DepthMark>,
}

impl<V> Default for ShadowActivationRecord<V> {
    fn default() -> Self {
        Self {
            stack: Vec::new(),
            locals: HashMap::new(),
            return_value: None,
            invocation_arg_count: None,
            depth_marks: Vec::new(),
        }
    }
}

impl<V> ShadowActivationRecord<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: ProvenanceNode<V>) {
        self.stack.push(node);
    }

    pub fn pop(&mut self) -> Result<ProvenanceNode<V>> {
        self.stack
            .pop()
            .ok_or_else(|| ShadowError::underflow(SiteLabel::Detached, 1, 0))
    }

    pub fn peek(&self) -> Result<&ProvenanceNode<V>> {
        self.peek_at(0)
    }

    /// Entry `distance` positions below the top; the stack is left untouched.
    pub fn peek_at(&self, distance: usize) -> Result<&ProvenanceNode<V>> {
        let available = self.stack.len();
        if distance >= available {
            return Err(ShadowError::underflow(
                SiteLabel::Detached,
                distance + 1,
                available,
            ));
        }
        Ok(&self.stack[available - 1 - distance])
    }

    /// Pop `count` entries, most recently pushed first.
    ///
    /// Fails without popping anything if fewer than `count` are available.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<ProvenanceNode<V>>> {
        let available = self.stack.len();
        if count > available {
            return Err(ShadowError::underflow(SiteLabel::Detached, count, available));
        }
        let mut popped = self.stack.split_off(available - count);
        popped.reverse();
        Ok(popped)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Bottom-to-top view of the operand stack.
    pub fn stack(&self) -> &[ProvenanceNode<V>] {
        &self.stack
    }

    /// Current provenance of a local.
    ///
    /// A local that was never observed being written (an implicit binding,
    /// or one written by uninstrumented code) gets an UNKNOWN node recorded
    /// as its first history entry.
    pub fn current_of(&mut self, local: &LocalId) -> ProvenanceNode<V> {
        let history = self.locals.entry(local.clone()).or_default();
        if history.is_empty() {
            history.push(ProvenanceNode::unknown());
        }
        history[history.len() - 1].clone()
    }

    pub fn record_write(&mut self, local: &LocalId, node: ProvenanceNode<V>) {
        self.locals.entry(local.clone()).or_default().push(node);
    }

    /// Full write history of a local, oldest first; empty if never touched.
    pub fn history_of(&self, local: &LocalId) -> &[ProvenanceNode<V>] {
        self.locals.get(local).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn locals(&self) -> impl Iterator<Item = &LocalId> {
        self.locals.keys()
    }

    pub fn begin_invocation(&mut self, arg_count: usize) -> Result<()> {
        if let Some(outstanding) = self.invocation_arg_count {
            return Err(ShadowError::invalid_state(format!(
                "invocation with {} argument(s) started while one with {} is outstanding",
                arg_count, outstanding
            )));
        }
        self.invocation_arg_count = Some(arg_count);
        Ok(())
    }

    pub fn end_invocation(&mut self) -> Result<usize> {
        self.invocation_arg_count
            .take()
            .ok_or_else(|| ShadowError::invalid_state("no outstanding invocation to end"))
    }

    pub fn has_ongoing_invocation(&self) -> bool {
        self.invocation_arg_count.is_some()
    }

    pub fn invocation_arg_count(&self) -> Option<usize> {
        self.invocation_arg_count
    }

    pub fn set_return_value(&mut self, node: ProvenanceNode<V>) {
        self.return_value = Some(node);
    }

    pub fn return_value(&self) -> Option<&ProvenanceNode<V>> {
        self.return_value.as_ref()
    }

    /// Remember the current depth for `site` until it returns.
    pub fn mark_depth(&mut self, site: SiteId) {
        self.depth_marks.push(DepthMark {
            site,
            depth: self.stack.len(),
        });
    }

    /// Remove and return the innermost depth recorded for `site`.
    pub fn take_depth_mark(&mut self, site: SiteId) -> Result<usize> {
        let position = self
            .depth_marks
            .iter()
            .rposition(|mark| mark.site == site)
            .ok_or_else(|| {
                ShadowError::invalid_state(format!("{} returned without a recorded stack depth", site))
            })?;
        Ok(self.depth_marks.remove(position).depth)
    }

    /// Drop the innermost depth recorded for `site`, if any.
    pub fn discard_depth_mark(&mut self, site: SiteId) -> bool {
        match self.depth_marks.iter().rposition(|mark| mark.site == site) {
            Some(position) => {
                self.depth_marks.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn pending_depth_marks(&self) -> usize {
        self.depth_marks.len()
    }
}
