#![forbid(unsafe_code)]

//! The handler node that hosts every channel mount point.
//!
//! # Design
//!
//! [`HooksHandler`] is a single host node, mounted as the first child under
//! the provider whose broadcast values the probes need. On every render it
//! reconciles its mount points against the store's registry, keyed by channel
//! id and ordered like the registry, then renders each one with its own scope
//! so probes see the same broadcast values the handler sees.
//!
//! # Invariants
//!
//! 1. The handler binds to the store on its first commit and unbinds during
//!    cleanup; a second handler on the same store fails with
//!    [`PortalError::AlreadyBound`](hookportal_core::PortalError).
//! 2. A handler that does not hold the binding never mounts channels and
//!    never touches the registry, so a rejected duplicate cannot settle or
//!    drop requests owned by the bound handler.
//! 3. A mount point keeps its identity across renders for as long as its
//!    channel stays registered.
//! 4. Each mount point gets exactly one pre-removal delivery: when its channel
//!    disappears or when the handler unmounts.
//! 5. `MountChannel` and `UnmountChannel` actions only ask the host for a new
//!    render pass; the handler never renders synchronously from a bus
//!    callback.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use hookportal_core::{
    Action, ChannelId, HandlerId, Invalidator, Node, RenderScope, Result, Store, Subscription,
};

use crate::mount_point::ChannelMountPoint;

type SharedInvalidator = Rc<RefCell<Option<Invalidator>>>;

fn request_render(invalidator: &SharedInvalidator) {
    let current = invalidator.borrow().clone();
    if let Some(invalidator) = current {
        invalidator.invalidate();
    }
}

pub struct HooksHandler {
    store: Store,
    handler_id: Option<HandlerId>,
    mounted: Vec<ChannelMountPoint>,
    removed: Vec<ChannelMountPoint>,
    invalidator: SharedInvalidator,
    subscription: Option<Subscription>,
}

impl fmt::Debug for HooksHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HooksHandler")
            .field("handler_id", &self.handler_id)
            .field("mounted", &self.mounted.len())
            .field("removed", &self.removed.len())
            .finish_non_exhaustive()
    }
}

impl HooksHandler {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            handler_id: None,
            mounted: Vec::new(),
            removed: Vec::new(),
            invalidator: Rc::new(RefCell::new(None)),
            subscription: None,
        }
    }

    /// Id assigned on first commit.
    #[must_use]
    pub fn handler_id(&self) -> Option<&HandlerId> {
        self.handler_id.as_ref()
    }

    /// Channel ids of the current mount points, in render order.
    #[must_use]
    pub fn mounted_channels(&self) -> Vec<ChannelId> {
        self.mounted
            .iter()
            .map(|mount| mount.channel_id().clone())
            .collect()
    }

    fn subscribe_to_store(&self) -> Subscription {
        let weak = self.store.downgrade();
        let invalidator = Rc::clone(&self.invalidator);
        self.store.subscribe(move |action| match action {
            Action::MountChannel { channel_id, .. } => {
                tracing::trace!(%channel_id, "handler scheduling render for new channel");
                request_render(&invalidator);
            }
            Action::UnmountChannel { channel_id } => {
                if let Some(store) = weak.upgrade() {
                    store.remove_channel(channel_id);
                }
                request_render(&invalidator);
            }
            Action::BindHandler { .. }
            | Action::UnbindHandler { .. }
            | Action::NewChannelState { .. } => {}
        })
    }

    fn reconcile(&mut self) {
        let registry = self.store.get_channels();
        let (kept, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut self.mounted)
            .into_iter()
            .partition(|mount| registry.contains(mount.channel_id()));
        let mut kept: HashMap<ChannelId, ChannelMountPoint> = kept
            .into_iter()
            .map(|mount| (mount.channel_id().clone(), mount))
            .collect();

        self.mounted = registry
            .iter()
            .map(|channel| {
                kept.remove(channel.id()).unwrap_or_else(|| {
                    ChannelMountPoint::new(
                        channel.clone(),
                        self.store.channel_helpers(channel.id().clone()),
                    )
                })
            })
            .collect();
        self.removed.extend(gone);
    }
}

impl Node for HooksHandler {
    fn render(&mut self, scope: &dyn RenderScope) {
        *self.invalidator.borrow_mut() = Some(scope.invalidator());
        if self.handler_id.is_none() {
            return;
        }
        self.reconcile();
        for mount in &mut self.mounted {
            mount.render(scope);
        }
    }

    fn commit(&mut self) -> Result<()> {
        if self.handler_id.is_none() {
            let handler_id = HandlerId::generate(&self.store.config().handler_id_prefix);
            // Listen first: channels opened by `BindHandler` observers must
            // still schedule a render.
            let subscription = self.subscribe_to_store();
            self.store.bind_handler(handler_id.clone())?;
            self.handler_id = Some(handler_id);
            self.subscription = Some(subscription);
        }

        for mut mount in std::mem::take(&mut self.removed) {
            mount.cleanup()?;
        }
        for mount in &mut self.mounted {
            mount.commit()?;
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        self.subscription = None;
        let Some(handler_id) = self.handler_id.take() else {
            *self.invalidator.borrow_mut() = None;
            return Ok(());
        };

        for mut mount in std::mem::take(&mut self.removed) {
            mount.cleanup()?;
        }
        let mounted = std::mem::take(&mut self.mounted);
        for mut mount in mounted {
            mount.cleanup()?;
            self.store.remove_channel(mount.channel_id());
        }

        self.store.unbind_handler(&handler_id)?;
        self.store.reset();
        *self.invalidator.borrow_mut() = None;
        Ok(())
    }
}
