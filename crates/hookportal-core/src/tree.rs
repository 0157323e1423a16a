#![forbid(unsafe_code)]

//! Host-tree contract.
//!
//! hookportal does not render anything itself. It needs a host that can:
//!
//! - mount a [`Node`] and call [`Node::render`] when the node was invalidated
//!   or when a broadcast value it read has changed;
//! - call [`Node::commit`] after the render pass has been committed;
//! - call [`Node::cleanup`] exactly once before the node is removed;
//! - propagate the value returned by [`Node::provide`] to descendants, where it
//!   is visible through [`RenderScope::context_any`].
//!
//! Nothing beyond this minimal capability set is assumed.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::error::Result;

/// Handle a node keeps to ask the host for another render pass.
#[derive(Clone)]
pub struct Invalidator {
    notify: Rc<dyn Fn()>,
}

impl Invalidator {
    pub fn new(notify: impl Fn() + 'static) -> Self {
        Self {
            notify: Rc::new(notify),
        }
    }

    /// An invalidator that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn invalidate(&self) {
        (self.notify)();
    }
}

impl fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invalidator")
    }
}

/// A broadcast value a node exposes to its descendants.
#[derive(Clone)]
pub struct Provided {
    pub type_id: TypeId,
    pub value: Rc<dyn Any>,
}

impl Provided {
    #[must_use]
    pub fn new<T: 'static>(value: Rc<T>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            value,
        }
    }
}

impl fmt::Debug for Provided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provided")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// What a node can see while rendering.
pub trait RenderScope {
    /// Nearest broadcast value of the given type above this node. Hosts
    /// record the read so the node re-renders when that value changes.
    fn context_any(&self, type_id: TypeId) -> Option<Rc<dyn Any>>;

    /// Invalidator bound to the node being rendered.
    fn invalidator(&self) -> Invalidator;
}

impl dyn RenderScope + '_ {
    /// Typed access to the nearest broadcast value of type `T`.
    #[must_use]
    pub fn use_context<T: 'static>(&self) -> Option<Rc<T>> {
        self.context_any(TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
    }
}

/// A unit the host mounts, renders, commits and cleans up.
///
/// Lifecycle violations (double bind, mismatched unbind) surface as `Err`
/// from `commit`/`cleanup` and the host reports them to whoever drove the
/// pass.
pub trait Node {
    /// Re-evaluate the node body.
    fn render(&mut self, scope: &dyn RenderScope);

    /// Runs after the render pass that rendered this node was committed.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runs once, right before the node is removed from the tree.
    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Broadcast value this node makes visible to its descendants.
    fn provide(&self) -> Option<Provided> {
        None
    }
}

/// Scope with no broadcast values and a no-op invalidator.
///
/// Useful for evaluating probes outside of any host tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedScope;

impl RenderScope for DetachedScope {
    fn context_any(&self, _type_id: TypeId) -> Option<Rc<dyn Any>> {
        None
    }

    fn invalidator(&self) -> Invalidator {
        Invalidator::noop()
    }
}
