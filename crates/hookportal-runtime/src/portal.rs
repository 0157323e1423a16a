#![forbid(unsafe_code)]

//! The Hook Portal: read tree-side probe values from imperative code.
//!
//! # Design
//!
//! [`HookPortal`] wraps a [`Store`]. Each call registers a channel whose
//! resolver feeds a [`PendingRequest`](crate::request); the mounted
//! [`HooksHandler`] renders a mount point for the channel, and every commit
//! of that mount point becomes a delivery. Once the request settles its
//! teardown unmounts the channel again.
//!
//! # Failure Modes
//!
//! - **No handler mounted**: a `tracing` warning is emitted and the request
//!   resolves to the absent value (`Ok(None)`). No channel is registered.
//! - **Probe fails or panics**: the request settles with `Err(ProbeError)`.
//! - **Handler unmounts first**: the pending request still settles through
//!   the pre-removal delivery.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use hookportal_core::{
    PortalConfig, PortalError, ProbeError, ProbeOutput, RenderScope, ResolverFn, Store,
};

use crate::handler::HooksHandler;
use crate::probe::{Probe, downcast_snapshot};
use crate::request::{HookState, PendingRequest, Resolver, ResolverUtils};

/// Entry point for reading probe values from outside the host tree.
#[derive(Debug, Clone, Default)]
pub struct HookPortal {
    store: Store,
}

impl HookPortal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: PortalConfig) -> Self {
        Self::from_store(Store::with_config(config))
    }

    #[must_use]
    pub fn from_store(store: Store) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The handler node to mount as the first child under the provider.
    #[must_use]
    pub fn handler(&self) -> HooksHandler {
        HooksHandler::new(self.store.clone())
    }

    /// Resolve with the first value `probe` produces after its mount point
    /// commits.
    pub fn get_hook_state<S: Clone + 'static>(
        &self,
        probe: impl Fn(&dyn RenderScope) -> S + 'static,
    ) -> HookState<S> {
        self.get_hook_state_with(Probe::new(probe), None, None)
    }

    /// Like [`get_hook_state`](Self::get_hook_state), with an optional
    /// resolver deciding when to settle and an optional channel name used in
    /// log fields.
    pub fn get_hook_state_with<S: Clone + 'static>(
        &self,
        probe: Probe<S>,
        resolver: Option<Resolver<S>>,
        name: Option<&str>,
    ) -> HookState<S> {
        let (request, state) = PendingRequest::new(
            resolver,
            name.map(str::to_owned),
            self.store.config().settle_on_forced_unmount,
        );
        self.open(&probe, &request);
        state
    }

    /// Forward every delivery of `probe` to `subscriber(value, before_unmount)`
    /// until [`HookSubscription::unsubscribe`] is called or the mount point
    /// goes away.
    pub fn subscribe_to_hook_state<S: Clone + 'static>(
        &self,
        probe: Probe<S>,
        mut subscriber: impl FnMut(Option<S>, bool) + 'static,
        name: Option<&str>,
    ) -> HookSubscription<S> {
        let active = Rc::new(Cell::new(true));
        let flag = Rc::clone(&active);
        let resolver: Resolver<S> = Box::new(move |value: Option<S>, utils: &ResolverUtils<S>| {
            if !flag.get() {
                utils.resolve_absent();
                return;
            }
            if utils.is_before_unmount() {
                subscriber(value.clone(), true);
                flag.set(false);
                utils.resolve_option(value);
            } else {
                subscriber(value, false);
            }
        });

        let (request, state) = PendingRequest::new(
            Some(resolver),
            name.map(str::to_owned),
            self.store.config().settle_on_forced_unmount,
        );
        self.open(&probe, &request);
        if request.is_settled() {
            active.set(false);
        }

        HookSubscription {
            active,
            request,
            completion: Some(state),
        }
    }

    fn open<S: Clone + 'static>(&self, probe: &Probe<S>, request: &PendingRequest<S>) {
        let deliver_to = request.clone();
        let resolver: ResolverFn =
            Rc::new(move |output: Option<ProbeOutput>, before_unmount: bool| {
                deliver_to.deliver(output.map(downcast_snapshot::<S>), before_unmount);
            });

        match self
            .store
            .add_channel(probe.erase(), resolver, request.name().map(str::to_owned))
        {
            Ok((channel_id, helpers)) => {
                tracing::trace!(%channel_id, "hook state channel opened");
                request.set_teardown(move || helpers.unmount_channel());
            }
            Err(PortalError::NotBound) => {
                tracing::warn!(
                    name = request.name().unwrap_or("UNKNOWN"),
                    "hook state requested while no handler is mounted; resolving absent"
                );
                request.settle(Ok(None));
            }
            Err(error) => {
                tracing::warn!(error = %error, "hook state channel could not be opened");
                request.settle(Err(ProbeError::new(error.to_string())));
            }
        }
    }
}

/// Handle for a continuous probe subscription. Dropping it unsubscribes.
#[must_use = "dropping a HookSubscription unsubscribes immediately"]
pub struct HookSubscription<S: Clone + 'static> {
    active: Rc<Cell<bool>>,
    request: PendingRequest<S>,
    completion: Option<HookState<S>>,
}

impl<S: Clone + 'static> HookSubscription<S> {
    /// Stop forwarding deliveries. The subscriber never runs after this
    /// returns.
    pub fn unsubscribe(&self) {
        self.active.set(false);
        if self.request.settle(Ok(None)) {
            tracing::debug!(
                name = self.request.name().unwrap_or("UNKNOWN"),
                "hook state subscription released"
            );
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get() && !self.request.is_settled()
    }

    /// Future reporting how the subscription ended: the last value on a
    /// forced unmount, `Ok(None)` after `unsubscribe`, or the probe error.
    pub fn take_completion(&mut self) -> Option<HookState<S>> {
        self.completion.take()
    }
}

impl<S: Clone + 'static> fmt::Debug for HookSubscription<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSubscription")
            .field("active", &self.is_active())
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl<S: Clone + 'static> Drop for HookSubscription<S> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn unmounted_portal_resolves_absent() {
        let portal = HookPortal::new();
        let state = portal.get_hook_state(|_| 42_u32);
        assert_eq!(state.now_or_never(), Some(Ok(None)));
        assert_eq!(portal.store().channel_count(), 0);
    }

    #[test]
    fn unmounted_subscription_is_inactive_and_completed() {
        let portal = HookPortal::new();
        let mut sub = portal.subscribe_to_hook_state(Probe::new(|_| 1_u8), |_, _| {}, None);
        assert!(!sub.is_active());
        let completion = sub.take_completion().unwrap();
        assert_eq!(completion.now_or_never(), Some(Ok(None)));
    }
}
