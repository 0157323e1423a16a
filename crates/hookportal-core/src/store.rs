#![forbid(unsafe_code)]

//! Channel registry and handler binding.
//!
//! # Design
//!
//! A [`Store`] owns three things: the ordered registry of [`Channel`]s, the
//! binding slot naming the one handler currently mounted, and the
//! [`ActionBus`] over which lifecycle changes are announced. `Store` is a
//! cheap handle; clones share the same state.
//!
//! # Invariants
//!
//! 1. `ids` and the keys of `by_id` are always in 1:1 correspondence, and
//!    `ids` preserves registration order.
//! 2. At most one handler is bound at a time.
//! 3. A channel can only be registered while a handler is bound.
//! 4. No `RefCell` borrow is held while the bus publishes or while a resolver
//!    runs, so subscribers and resolvers may call back into the store.
//!
//! # Failure Modes
//!
//! - **Registering while unbound**: [`Store::add_channel`] returns
//!   [`PortalError::NotBound`] and the registry is untouched.
//! - **Double bind**: [`PortalError::AlreadyBound`].
//! - **Stale unbind**: [`PortalError::InvalidHandler`]; the current binding
//!   stays in place.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::action::{Action, ActionBus};
use crate::bus::Subscription;
use crate::channel::{Channel, ProbeFn, ResolverFn, Snapshot};
use crate::config::PortalConfig;
use crate::error::{PortalError, Result};
use crate::ids::{ChannelId, HandlerId};

/// Ordered set of registered channels.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    ids: Vec<ChannelId>,
    by_id: HashMap<ChannelId, Channel>,
}

impl Registry {
    /// Channel ids in registration order.
    #[must_use]
    pub fn ids(&self) -> &[ChannelId] {
        &self.ids
    }

    #[must_use]
    pub fn by_id(&self) -> &HashMap<ChannelId, Channel> {
        &self.by_id
    }

    #[must_use]
    pub fn get(&self, id: &ChannelId) -> Option<&Channel> {
        self.by_id.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ChannelId) -> bool {
        self.by_id.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Channels in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.ids.iter().filter_map(|id| self.by_id.get(id))
    }

    fn insert(&mut self, channel: Channel) {
        let id = channel.id().clone();
        if self.by_id.insert(id.clone(), channel).is_none() {
            self.ids.push(id);
        }
    }

    fn remove(&mut self, id: &ChannelId) -> Option<Channel> {
        let removed = self.by_id.remove(id)?;
        self.ids.retain(|existing| existing != id);
        Some(removed)
    }

    fn drain(&mut self) -> Vec<Channel> {
        let ids = std::mem::take(&mut self.ids);
        let mut by_id = std::mem::take(&mut self.by_id);
        ids.into_iter().filter_map(|id| by_id.remove(&id)).collect()
    }
}

struct StoreInner {
    registry: RefCell<Registry>,
    binding: RefCell<Option<HandlerId>>,
    bus: ActionBus,
    config: PortalConfig,
}

/// Shared channel registry plus handler binding.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("channels", &self.inner.registry.borrow().len())
            .field("handler_id", &*self.inner.binding.borrow())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PortalConfig::default())
    }

    #[must_use]
    pub fn with_config(config: PortalConfig) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                registry: RefCell::new(Registry::default()),
                binding: RefCell::new(None),
                bus: ActionBus::new(),
                config,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    /// Record `handler_id` as the bound handler.
    pub fn bind_handler(&self, handler_id: HandlerId) -> Result<()> {
        {
            let mut binding = self.inner.binding.borrow_mut();
            if let Some(bound) = binding.as_ref() {
                tracing::debug!(%bound, attempted = %handler_id, "handler already bound");
                return Err(PortalError::AlreadyBound {
                    bound: bound.clone(),
                });
            }
            *binding = Some(handler_id.clone());
        }
        tracing::debug!(%handler_id, "handler bound");
        self.inner.bus.publish(&Action::BindHandler { handler_id });
        Ok(())
    }

    /// Release the binding held by `handler_id`.
    ///
    /// Channels still registered at this point have lost their mount point;
    /// each one receives a final `(None, before_unmount = true)` delivery so
    /// its request can settle.
    pub fn unbind_handler(&self, handler_id: &HandlerId) -> Result<()> {
        {
            let mut binding = self.inner.binding.borrow_mut();
            if binding.as_ref() != Some(handler_id) {
                return Err(PortalError::InvalidHandler {
                    expected: binding.clone(),
                    got: handler_id.clone(),
                });
            }
            *binding = None;
        }

        let orphans = self.reset();
        tracing::debug!(%handler_id, orphans = orphans.len(), "handler unbound");
        for channel in &orphans {
            channel.deliver(None, true);
        }

        self.inner.bus.publish(&Action::UnbindHandler {
            handler_id: handler_id.clone(),
        });
        Ok(())
    }

    /// Register a channel for `probe`. Fails with [`PortalError::NotBound`]
    /// when no handler is mounted.
    pub fn add_channel(
        &self,
        probe: ProbeFn,
        resolver: ResolverFn,
        name: Option<String>,
    ) -> Result<(ChannelId, ChannelHelpers)> {
        if !self.is_bound() {
            return Err(PortalError::NotBound);
        }

        let channel_id = ChannelId::generate(&self.inner.config.channel_id_prefix);
        self.inner.registry.borrow_mut().insert(Channel::new(
            channel_id.clone(),
            probe,
            resolver,
            name.clone(),
        ));
        tracing::debug!(
            %channel_id,
            name = name.as_deref().unwrap_or("UNKNOWN"),
            "channel added"
        );

        self.inner.bus.publish(&Action::MountChannel {
            channel_id: channel_id.clone(),
            name,
        });

        let helpers = self.channel_helpers(channel_id.clone());
        Ok((channel_id, helpers))
    }

    /// Drop the channel record. Removing an unknown id is a no-op.
    pub fn remove_channel(&self, channel_id: &ChannelId) -> Option<Channel> {
        let removed = self.inner.registry.borrow_mut().remove(channel_id);
        if removed.is_some() {
            tracing::debug!(%channel_id, "channel removed");
        }
        removed
    }

    /// Read-only snapshot of the registry.
    #[must_use]
    pub fn get_channels(&self) -> Registry {
        self.inner.registry.borrow().clone()
    }

    #[must_use]
    pub fn channel(&self, channel_id: &ChannelId) -> Option<Channel> {
        self.inner.registry.borrow().get(channel_id).cloned()
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Helpers bound to `channel_id` that do not keep the store alive.
    #[must_use]
    pub fn channel_helpers(&self, channel_id: ChannelId) -> ChannelHelpers {
        ChannelHelpers {
            channel_id,
            store: self.downgrade(),
        }
    }

    /// Clear the registry, returning the removed channels in registration
    /// order.
    pub fn reset(&self) -> Vec<Channel> {
        let drained = self.inner.registry.borrow_mut().drain();
        if !drained.is_empty() {
            tracing::trace!(count = drained.len(), "registry reset");
        }
        drained
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.binding.borrow().is_some()
    }

    #[must_use]
    pub fn handler_id(&self) -> Option<HandlerId> {
        self.inner.binding.borrow().clone()
    }

    /// Observe every action published on this store's bus.
    pub fn subscribe(&self, callback: impl Fn(&Action) + 'static) -> Subscription {
        self.inner.bus.subscribe(callback)
    }

    /// Publish `action` on this store's bus.
    pub fn dispatch(&self, action: &Action) -> usize {
        tracing::trace!(kind = action.kind(), "dispatch");
        self.inner.bus.publish(action)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle to a [`Store`].
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    #[must_use]
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl std::fmt::Debug for WeakStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakStore")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Per-channel operations handed back by [`Store::add_channel`].
#[derive(Debug, Clone)]
pub struct ChannelHelpers {
    channel_id: ChannelId,
    store: WeakStore,
}

impl ChannelHelpers {
    #[must_use]
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Remove the channel and announce it so the mount point goes away.
    pub fn unmount_channel(&self) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        store.remove_channel(&self.channel_id);
        store.dispatch(&Action::UnmountChannel {
            channel_id: self.channel_id.clone(),
        });
    }

    /// Announce a freshly evaluated probe output.
    pub fn dispatch_new_state(&self, state: Snapshot) {
        if let Some(store) = self.store.upgrade() {
            store.dispatch(&Action::NewChannelState {
                channel_id: self.channel_id.clone(),
                state,
            });
        }
    }
}
