//! Shared, observable configuration with shallow-compared selections.
//!
//! [`ConfigStore<C>`] holds one configuration value. Updates go through
//! [`ConfigStore::set_config`], which publishes a [`ConfigEvent`] on an
//! [`EventBus`]. Consumers derive narrow views with
//! [`ConfigStore::use_config`] and are only invalidated when their view
//! changes under [`ShallowEq`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use hookportal_core::{EventBus, Invalidator, ShallowEq, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEvent {
    /// The value was replaced; `version` is the new version.
    Updated { version: u64 },
}

struct ConfigInner<C> {
    value: RefCell<C>,
    version: Cell<u64>,
    bus: EventBus<ConfigEvent>,
}

pub struct ConfigStore<C> {
    inner: Rc<ConfigInner<C>>,
}

impl<C> Clone for ConfigStore<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for ConfigStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<C: Default + Clone + 'static> Default for ConfigStore<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C: Clone + 'static> ConfigStore<C> {
    pub fn new(initial: C) -> Self {
        Self {
            inner: Rc::new(ConfigInner {
                value: RefCell::new(initial),
                version: Cell::new(0),
                bus: EventBus::new(),
            }),
        }
    }

    /// Copy of the current value.
    #[must_use]
    pub fn get_config(&self) -> C {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without copying it.
    pub fn with_config<R>(&self, read: impl FnOnce(&C) -> R) -> R {
        read(&self.inner.value.borrow())
    }

    /// Replace the value with `modify(current)` and notify subscribers.
    pub fn set_config(&self, modify: impl FnOnce(C) -> C) {
        let next = modify(self.get_config());
        *self.inner.value.borrow_mut() = next;
        let version = self.inner.version.get() + 1;
        self.inner.version.set(version);
        tracing::debug!(version, "config updated");
        self.inner.bus.publish(&ConfigEvent::Updated { version });
    }

    /// Number of updates applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    pub fn subscribe(&self, callback: impl Fn(&ConfigEvent) + 'static) -> Subscription {
        self.inner.bus.subscribe(callback)
    }

    /// Derive a view of the configuration for one consumer.
    pub fn use_config<R, F>(&self, selector: F, invalidator: Invalidator) -> ConfigSelection<C, R>
    where
        R: ShallowEq + Clone + 'static,
        F: Fn(&C) -> R + 'static,
    {
        let initial = self.with_config(&selector);
        let state = Rc::new(ConfigSelectionState {
            selector: Box::new(selector),
            cached: RefCell::new(initial),
            invalidator,
        });

        let weak_store: Weak<ConfigInner<C>> = Rc::downgrade(&self.inner);
        let weak_state = Rc::downgrade(&state);
        let subscription = self.subscribe(move |_| {
            let (Some(store), Some(state)) = (weak_store.upgrade(), weak_state.upgrade()) else {
                return;
            };
            let changed = state.store_if_changed(&store.value.borrow());
            if changed {
                state.invalidator.invalidate();
            }
        });

        ConfigSelection {
            state,
            store: self.clone(),
            _subscription: subscription,
        }
    }
}

struct ConfigSelectionState<C, R> {
    selector: Box<dyn Fn(&C) -> R>,
    cached: RefCell<R>,
    invalidator: Invalidator,
}

impl<C, R: ShallowEq> ConfigSelectionState<C, R> {
    fn store_if_changed(&self, current: &C) -> bool {
        let next = (self.selector)(current);
        if self.cached.borrow().shallow_eq(&next) {
            return false;
        }
        *self.cached.borrow_mut() = next;
        true
    }
}

/// One consumer's view of a [`ConfigStore`]. Dropping it unsubscribes.
pub struct ConfigSelection<C, R> {
    state: Rc<ConfigSelectionState<C, R>>,
    store: ConfigStore<C>,
    _subscription: Subscription,
}

impl<C, R: fmt::Debug> fmt::Debug for ConfigSelection<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSelection")
            .field("cached", &*self.state.cached.borrow())
            .finish_non_exhaustive()
    }
}

impl<C: Clone + 'static, R: ShallowEq + Clone + 'static> ConfigSelection<C, R> {
    /// Current derived value, re-checked against the store.
    #[must_use]
    pub fn read(&self) -> R {
        self.store
            .with_config(|current| self.state.store_if_changed(current));
        self.state.cached.borrow().clone()
    }
}
