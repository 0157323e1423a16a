#![forbid(unsafe_code)]

//! Context selectors: cheap, shallow-compared views of a broadcast value.
//!
//! # Design
//!
//! A [`ContextSelector<T>`] bundles three pieces:
//!
//! - a [`BroadcastProvider<T>`] node that propagates `T` to its descendants
//!   and attaches a [`SourceAccessor<T>`] whenever it renders;
//! - a [`HooksHandler`] (mounted as the provider's first child) through which
//!   a continuous subscription watches `T` from inside the tree;
//! - [`Selection`]s, each caching `selector(&T)` for one consumer.
//!
//! A consumer is invalidated only when its derived value changes under
//! [`ShallowEq`]; unrelated updates to `T` never re-render it.
//!
//! # Invariants
//!
//! 1. The first read computes `selector(current)` synchronously.
//! 2. A delivery whose derived value is shallow-equal to the cache neither
//!    replaces the cache nor invalidates the consumer.
//! 3. After the provider unmounts, reads see the absent source and return the
//!    last cached value.
//! 4. A selection created before any handler is bound (for example in the
//!    same render pass that mounts the handler) opens its subscription when
//!    the handler binds, not never.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use hookportal_core::{
    Action, Invalidator, Node, PortalConfig, Provided, RenderScope, ShallowEq, Subscription,
};

use crate::handler::HooksHandler;
use crate::portal::{HookPortal, HookSubscription};
use crate::probe::context_probe;

/// Synchronous window onto the provider's current value. Absent while no
/// provider is rendered.
pub struct SourceAccessor<T> {
    slot: Rc<RefCell<Option<Rc<T>>>>,
}

impl<T> Clone for SourceAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T> Default for SourceAccessor<T> {
    fn default() -> Self {
        Self {
            slot: Rc::new(RefCell::new(None)),
        }
    }
}

impl<T> fmt::Debug for SourceAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceAccessor")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl<T> SourceAccessor<T> {
    #[must_use]
    pub fn get_state(&self) -> Option<Rc<T>> {
        self.slot.borrow().clone()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.slot.borrow().is_some()
    }

    fn attach(&self, value: Rc<T>) {
        *self.slot.borrow_mut() = Some(value);
    }

    fn detach(&self) {
        self.slot.borrow_mut().take();
    }
}

struct ProviderState<T> {
    value: RefCell<Rc<T>>,
    invalidator: RefCell<Option<Invalidator>>,
}

/// Host node that broadcasts `T` to its descendants.
pub struct BroadcastProvider<T> {
    state: Rc<ProviderState<T>>,
    accessor: SourceAccessor<T>,
}

impl<T> fmt::Debug for BroadcastProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastProvider")
            .field("accessor", &self.accessor)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> BroadcastProvider<T> {
    /// A standalone provider with its own accessor.
    pub fn new(value: T) -> (Self, ProviderHandle<T>) {
        Self::with_source(value, SourceAccessor::default())
    }

    /// A provider that keeps `accessor` attached while it is rendered.
    pub fn with_source(value: T, accessor: SourceAccessor<T>) -> (Self, ProviderHandle<T>) {
        let state = Rc::new(ProviderState {
            value: RefCell::new(Rc::new(value)),
            invalidator: RefCell::new(None),
        });
        let handle = ProviderHandle {
            state: Rc::clone(&state),
        };
        (Self { state, accessor }, handle)
    }
}

impl<T: 'static> Node for BroadcastProvider<T> {
    fn render(&mut self, scope: &dyn RenderScope) {
        *self.state.invalidator.borrow_mut() = Some(scope.invalidator());
        let current = Rc::clone(&self.state.value.borrow());
        self.accessor.attach(current);
    }

    fn cleanup(&mut self) -> hookportal_core::Result<()> {
        self.accessor.detach();
        self.state.invalidator.borrow_mut().take();
        Ok(())
    }

    fn provide(&self) -> Option<Provided> {
        Some(Provided::new(Rc::clone(&self.state.value.borrow())))
    }
}

/// Updates the value a [`BroadcastProvider`] broadcasts.
pub struct ProviderHandle<T> {
    state: Rc<ProviderState<T>>,
}

impl<T> Clone for ProviderHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for ProviderHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle").finish_non_exhaustive()
    }
}

impl<T> ProviderHandle<T> {
    #[must_use]
    pub fn get(&self) -> Rc<T> {
        Rc::clone(&self.state.value.borrow())
    }

    /// Replace the broadcast value and ask the host to re-render the
    /// provider.
    pub fn set(&self, value: T) {
        *self.state.value.borrow_mut() = Rc::new(value);
        let invalidator = self.state.invalidator.borrow().clone();
        if let Some(invalidator) = invalidator {
            invalidator.invalidate();
        }
    }

    pub fn update(&self, modify: impl FnOnce(&T) -> T) {
        let next = modify(&self.get());
        self.set(next);
    }
}

/// Selector factory over a broadcast value of type `T`.
pub struct ContextSelector<T> {
    portal: HookPortal,
    accessor: SourceAccessor<T>,
}

impl<T> fmt::Debug for ContextSelector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSelector")
            .field("portal", &self.portal)
            .field("accessor", &self.accessor)
            .finish()
    }
}

/// Create a selector with its own bridge and accessor.
#[must_use]
pub fn create_context_selector<T: 'static>() -> ContextSelector<T> {
    ContextSelector::new()
}

impl<T: 'static> Default for ContextSelector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> ContextSelector<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PortalConfig::default())
    }

    #[must_use]
    pub fn with_config(config: PortalConfig) -> Self {
        Self {
            portal: HookPortal::with_config(config),
            accessor: SourceAccessor::default(),
        }
    }

    /// Provider node for `initial`, wired to this selector's accessor.
    pub fn provider(&self, initial: T) -> (BroadcastProvider<T>, ProviderHandle<T>) {
        BroadcastProvider::with_source(initial, self.accessor.clone())
    }

    /// Handler node to mount as the provider's first child.
    #[must_use]
    pub fn handler(&self) -> HooksHandler {
        self.portal.handler()
    }

    #[must_use]
    pub fn source(&self) -> SourceAccessor<T> {
        self.accessor.clone()
    }

    #[must_use]
    pub fn portal(&self) -> &HookPortal {
        &self.portal
    }

    /// Derive a view of `T` for one consumer. `invalidator` is asked for a
    /// re-render whenever the derived value changes.
    pub fn select<R, F>(&self, selector: F, invalidator: Invalidator) -> Selection<T, R>
    where
        R: ShallowEq + Clone + 'static,
        F: Fn(&T) -> R + 'static,
    {
        let selector: Rc<dyn Fn(&T) -> R> = Rc::new(selector);
        let initial = self.accessor.get_state().map(|value| selector(&value));
        let state = Rc::new(SelectionState {
            selector,
            cached: RefCell::new(initial),
            fresh: Cell::new(false),
            invalidator,
        });

        let slot: SubscriptionSlot<T> = Rc::new(RefCell::new(None));
        if self.portal.store().is_bound() {
            *slot.borrow_mut() = Some(watch_source(&self.portal, &state));
        }

        // Handlers bind on commit, after the consumers rendered in the same
        // pass have already selected. Open (or reopen) once one binds.
        let weak_slot = Rc::downgrade(&slot);
        let portal = self.portal.clone();
        let watcher = Rc::clone(&state);
        let on_bind = self.portal.store().subscribe(move |action| {
            let Action::BindHandler { handler_id } = action else {
                return;
            };
            let Some(slot) = weak_slot.upgrade() else {
                return;
            };
            if slot.borrow().as_ref().is_some_and(HookSubscription::is_active) {
                return;
            }
            tracing::trace!(%handler_id, "context selection subscribing to new handler");
            let previous = slot.replace(Some(watch_source(&portal, &watcher)));
            drop(previous);
        });

        Selection {
            state,
            accessor: self.accessor.clone(),
            subscription: slot,
            _on_bind: on_bind,
        }
    }
}

type SubscriptionSlot<T> = Rc<RefCell<Option<HookSubscription<Option<Rc<T>>>>>>;

/// Continuous subscription feeding `state` from the tree context.
fn watch_source<T, R>(
    portal: &HookPortal,
    state: &Rc<SelectionState<T, R>>,
) -> HookSubscription<Option<Rc<T>>>
where
    T: 'static,
    R: ShallowEq + 'static,
{
    let watcher = Rc::clone(state);
    portal.subscribe_to_hook_state(
        context_probe::<T>(),
        move |value: Option<Option<Rc<T>>>, _before_unmount| {
            let Some(Some(current)) = value else {
                return;
            };
            if watcher.store_if_changed(&current) {
                watcher.fresh.set(true);
                watcher.invalidator.invalidate();
            }
        },
        Some("context_selector"),
    )
}

struct SelectionState<T, R> {
    selector: Rc<dyn Fn(&T) -> R>,
    cached: RefCell<Option<R>>,
    fresh: Cell<bool>,
    invalidator: Invalidator,
}

impl<T, R: ShallowEq> SelectionState<T, R> {
    /// Recompute against `current`; replace the cache only on a shallow
    /// difference. Returns whether the cache changed.
    fn store_if_changed(&self, current: &T) -> bool {
        let next = (self.selector)(current);
        let unchanged = self
            .cached
            .borrow()
            .as_ref()
            .is_some_and(|previous| previous.shallow_eq(&next));
        if !unchanged {
            *self.cached.borrow_mut() = Some(next);
        }
        !unchanged
    }
}

/// One consumer's cached view. Dropping it releases the subscription.
pub struct Selection<T: 'static, R: ShallowEq + Clone + 'static> {
    state: Rc<SelectionState<T, R>>,
    accessor: SourceAccessor<T>,
    subscription: SubscriptionSlot<T>,
    _on_bind: Subscription,
}

impl<T: 'static, R: ShallowEq + Clone + fmt::Debug + 'static> fmt::Debug for Selection<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("cached", &*self.state.cached.borrow())
            .field("subscribed", &self.is_subscribed())
            .finish_non_exhaustive()
    }
}

impl<T: 'static, R: ShallowEq + Clone + 'static> Selection<T, R> {
    /// Current derived value.
    ///
    /// On a render triggered by the subscription the cached value is already
    /// current. Otherwise the value is re-checked against the source so a
    /// render caused by something else never shows a stale view.
    #[must_use]
    pub fn read(&self) -> Option<R> {
        if !self.state.fresh.replace(false) {
            if let Some(current) = self.accessor.get_state() {
                self.state.store_if_changed(&current);
            }
        }
        self.state.cached.borrow().clone()
    }

    /// Whether the underlying subscription is live. `false` until a handler
    /// has bound, and again once the mount point went away.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .borrow()
            .as_ref()
            .is_some_and(HookSubscription::is_active)
    }
}
