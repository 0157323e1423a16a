#![forbid(unsafe_code)]

//! Deterministic host tree.
//!
//! [`TestTree`] implements the host contract from
//! [`hookportal_core::tree`] without any rendering backend. Work only happens
//! inside [`TestTree::flush`], so tests control exactly when render passes
//! run.
//!
//! # Pass semantics
//!
//! Each pass walks the tree depth-first from every root:
//!
//! 1. A node renders if it was invalidated, or if it read a broadcast type
//!    whose value changed earlier in the same pass. Children of a rendered
//!    node are **not** re-rendered automatically.
//! 2. A node's [`Provided`] value is visible to its descendants. A change is
//!    detected by pointer identity of the provided `Rc`.
//! 3. After the walk, every rendered node is committed in post-order
//!    (children before parents).
//!
//! Passes repeat until no node is invalidated. A tree that keeps
//! invalidating itself fails with [`HarnessError::RenderLoop`] after
//! `max_passes`.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use hookportal_core::{Invalidator, Node, Provided, RenderScope};

use crate::error::{HarnessError, Result};

/// Default bound on passes per [`TestTree::flush`].
pub const DEFAULT_MAX_PASSES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

struct Slot {
    node: Option<Box<dyn Node>>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    dirty: Rc<Cell<bool>>,
    reads: Vec<TypeId>,
    provided: Option<Provided>,
    renders: u64,
}

impl Slot {
    fn invalidator(&self) -> Invalidator {
        let dirty = Rc::clone(&self.dirty);
        Invalidator::new(move || dirty.set(true))
    }
}

struct HarnessScope<'a> {
    contexts: &'a [(TypeId, Rc<dyn Any>)],
    reads: RefCell<Vec<TypeId>>,
    invalidator: Invalidator,
}

impl RenderScope for HarnessScope<'_> {
    fn context_any(&self, type_id: TypeId) -> Option<Rc<dyn Any>> {
        let mut reads = self.reads.borrow_mut();
        if !reads.contains(&type_id) {
            reads.push(type_id);
        }
        self.contexts
            .iter()
            .rev()
            .find(|(id, _)| *id == type_id)
            .map(|(_, value)| Rc::clone(value))
    }

    fn invalidator(&self) -> Invalidator {
        self.invalidator.clone()
    }
}

fn same_provided(previous: Option<&Provided>, next: Option<&Provided>) -> bool {
    match (previous, next) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.type_id == b.type_id && std::ptr::addr_eq(Rc::as_ptr(&a.value), Rc::as_ptr(&b.value))
        }
        _ => false,
    }
}

/// In-process host tree driving [`Node`]s through render, commit and
/// cleanup.
pub struct TestTree {
    slots: HashMap<NodeId, Slot>,
    roots: Vec<NodeId>,
    next_id: u64,
    max_passes: usize,
}

impl fmt::Debug for TestTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestTree")
            .field("nodes", &self.slots.len())
            .field("roots", &self.roots)
            .field("max_passes", &self.max_passes)
            .finish()
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            roots: Vec::new(),
            next_id: 0,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    #[must_use]
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Mount `node` as a new root. It renders on the next flush.
    pub fn mount_root(&mut self, node: impl Node + 'static) -> NodeId {
        let id = self.insert(Box::new(node), None);
        self.roots.push(id);
        id
    }

    /// Mount `node` as the last child of `parent`.
    pub fn mount_child(&mut self, parent: NodeId, node: impl Node + 'static) -> Result<NodeId> {
        if !self.slots.contains_key(&parent) {
            return Err(HarnessError::UnknownNode(parent));
        }
        let id = self.insert(Box::new(node), Some(parent));
        self.slot_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Remove `id` and its subtree. Cleanup runs children first; every node
    /// is cleaned up even if an earlier one fails, and the first error is
    /// returned.
    pub fn unmount(&mut self, id: NodeId) -> Result<()> {
        let parent = self.slot(id)?.parent;
        match parent {
            Some(parent) => self.slot_mut(parent)?.children.retain(|child| *child != id),
            None => self.roots.retain(|root| *root != id),
        }

        let mut order = Vec::new();
        self.post_order(id, &mut order);
        let mut first_error = None;
        for node_id in order {
            let Some(mut slot) = self.slots.remove(&node_id) else {
                continue;
            };
            if let Some(node) = slot.node.as_mut()
                && let Err(error) = node.cleanup()
            {
                tracing::debug!(node = %node_id, %error, "cleanup failed");
                first_error.get_or_insert(HarnessError::Portal(error));
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Run render passes until nothing is invalidated. Returns the number of
    /// passes run.
    pub fn flush(&mut self) -> Result<usize> {
        let mut passes = 0;
        while self.has_pending_work() {
            if passes == self.max_passes {
                return Err(HarnessError::RenderLoop { passes });
            }
            passes += 1;

            let mut rendered = Vec::new();
            let mut contexts = Vec::new();
            let mut changed = Vec::new();
            for root in self.roots.clone() {
                self.render_subtree(root, &mut contexts, &mut changed, &mut rendered)?;
            }
            tracing::trace!(pass = passes, rendered = rendered.len(), "render pass");

            for node_id in rendered {
                self.commit_node(node_id)?;
            }
        }
        Ok(passes)
    }

    /// Invalidator bound to `id`, as the node itself would receive it.
    pub fn invalidator(&self, id: NodeId) -> Result<Invalidator> {
        Ok(self.slot(id)?.invalidator())
    }

    /// How many times `id` has rendered.
    #[must_use]
    pub fn render_count(&self, id: NodeId) -> Option<u64> {
        self.slots.get(&id).map(|slot| slot.renders)
    }

    #[must_use]
    pub fn is_mounted(&self, id: NodeId) -> bool {
        self.slots.contains_key(&id)
    }

    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.slots.values().any(|slot| slot.dirty.get())
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.slots.len()
    }

    fn insert(&mut self, node: Box<dyn Node>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.slots.insert(
            id,
            Slot {
                node: Some(node),
                parent,
                children: Vec::new(),
                dirty: Rc::new(Cell::new(true)),
                reads: Vec::new(),
                provided: None,
                renders: 0,
            },
        );
        id
    }

    fn slot(&self, id: NodeId) -> Result<&Slot> {
        self.slots.get(&id).ok_or(HarnessError::UnknownNode(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Slot> {
        self.slots.get_mut(&id).ok_or(HarnessError::UnknownNode(id))
    }

    fn post_order(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if let Some(slot) = self.slots.get(&id) {
            for child in &slot.children {
                self.post_order(*child, out);
            }
            out.push(id);
        }
    }

    fn render_subtree(
        &mut self,
        id: NodeId,
        contexts: &mut Vec<(TypeId, Rc<dyn Any>)>,
        changed: &mut Vec<TypeId>,
        rendered: &mut Vec<NodeId>,
    ) -> Result<()> {
        let slot = self.slot(id)?;
        let needs_render =
            slot.dirty.get() || slot.reads.iter().any(|type_id| changed.contains(type_id));

        let mut provided_changed = false;
        if needs_render {
            let slot = self.slot_mut(id)?;
            slot.dirty.set(false);
            let invalidator = slot.invalidator();
            let mut node = slot.node.take().ok_or(HarnessError::UnknownNode(id))?;

            let scope = HarnessScope {
                contexts: contexts.as_slice(),
                reads: RefCell::new(Vec::new()),
                invalidator,
            };
            node.render(&scope);
            let reads = scope.reads.into_inner();
            let provided = node.provide();

            let slot = self.slot_mut(id)?;
            provided_changed = !same_provided(slot.provided.as_ref(), provided.as_ref());
            slot.provided = provided;
            slot.reads = reads;
            slot.renders += 1;
            slot.node = Some(node);
        }

        let slot = self.slot(id)?;
        let provided = slot.provided.clone();
        let children = slot.children.clone();

        if let Some(provided) = &provided {
            contexts.push((provided.type_id, Rc::clone(&provided.value)));
            if provided_changed {
                changed.push(provided.type_id);
            }
        }
        for child in children {
            self.render_subtree(child, contexts, changed, rendered)?;
        }
        if provided.is_some() {
            contexts.pop();
            if provided_changed {
                changed.pop();
            }
        }

        if needs_render {
            rendered.push(id);
        }
        Ok(())
    }

    fn commit_node(&mut self, id: NodeId) -> Result<()> {
        // A node unmounted by an earlier commit in this pass is skipped.
        let Some(slot) = self.slots.get_mut(&id) else {
            return Ok(());
        };
        let Some(mut node) = slot.node.take() else {
            return Ok(());
        };
        let outcome = node.commit();
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.node = Some(node);
        }
        outcome.map_err(HarnessError::from)
    }
}
