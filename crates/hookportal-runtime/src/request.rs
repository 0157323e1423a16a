#![forbid(unsafe_code)]

//! Pending requests and the [`HookState`] future.
//!
//! # Design
//!
//! Every `get_hook_state` / `subscribe_to_hook_state` call owns one
//! [`PendingRequest`]: a two-state object (pending, settled) holding the
//! sending half of a `futures` oneshot channel, the caller's resolver and a
//! teardown hook that removes the channel from the registry. The caller keeps
//! the receiving half as a [`HookState`].
//!
//! # Invariants
//!
//! 1. A request settles at most once; later `resolve`/`reject` calls and later
//!    deliveries are no-ops.
//! 2. Settling drops the caller's resolver and runs the teardown exactly once.
//! 3. A request that receives a pre-removal delivery always ends up settled
//!    (unless `settle_on_forced_unmount` was turned off and the resolver
//!    ignored it).
//!
//! # Failure Modes
//!
//! - **Probe error**: the request settles with `Err(ProbeError)` before the
//!   caller's resolver runs.
//! - **Every sender dropped before settling**: the [`HookState`] resolves to
//!   an error instead of hanging.
//! - **Delivery while the resolver is running**: ignored; the resolver is
//!   not re-entered.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use hookportal_core::ProbeError;

/// Outcome of a hook-state request: `Ok(None)` is the absent value.
pub type HookResult<S> = Result<Option<S>, ProbeError>;

/// Caller-supplied resolver, run on every delivery until the request settles.
pub type Resolver<S> = Box<dyn FnMut(Option<S>, &ResolverUtils<S>)>;

struct RequestInner<S> {
    settled: Cell<bool>,
    sender: RefCell<Option<oneshot::Sender<HookResult<S>>>>,
    resolver: RefCell<Option<Resolver<S>>>,
    has_resolver: bool,
    teardown: RefCell<Option<Box<dyn FnOnce()>>>,
    name: Option<String>,
    settle_on_forced_unmount: bool,
}

pub(crate) struct PendingRequest<S> {
    inner: Rc<RequestInner<S>>,
}

impl<S> Clone for PendingRequest<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for PendingRequest<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("name", &self.inner.name)
            .field("settled", &self.inner.settled.get())
            .finish_non_exhaustive()
    }
}

impl<S: Clone + 'static> PendingRequest<S> {
    pub(crate) fn new(
        resolver: Option<Resolver<S>>,
        name: Option<String>,
        settle_on_forced_unmount: bool,
    ) -> (Self, HookState<S>) {
        let (sender, receiver) = oneshot::channel();
        let request = Self {
            inner: Rc::new(RequestInner {
                settled: Cell::new(false),
                sender: RefCell::new(Some(sender)),
                has_resolver: resolver.is_some(),
                resolver: RefCell::new(resolver),
                teardown: RefCell::new(None),
                name,
                settle_on_forced_unmount,
            }),
        };
        (
            request,
            HookState {
                receiver,
                taken: false,
            },
        )
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.inner.settled.get()
    }

    /// Install the hook run on settlement. Runs immediately if the request
    /// already settled.
    pub(crate) fn set_teardown(&self, teardown: impl FnOnce() + 'static) {
        if self.is_settled() {
            teardown();
        } else {
            *self.inner.teardown.borrow_mut() = Some(Box::new(teardown));
        }
    }

    /// Move to the settled state. Returns `false` if already settled.
    pub(crate) fn settle(&self, outcome: HookResult<S>) -> bool {
        if self.inner.settled.replace(true) {
            tracing::trace!(
                name = self.name().unwrap_or("UNKNOWN"),
                "settle ignored: request already settled"
            );
            return false;
        }

        tracing::debug!(
            name = self.name().unwrap_or("UNKNOWN"),
            ok = outcome.is_ok(),
            present = matches!(outcome, Ok(Some(_))),
            "request settled"
        );
        if let Some(sender) = self.inner.sender.borrow_mut().take() {
            // The caller may have dropped the HookState; nothing to report then.
            let _ = sender.send(outcome);
        }

        let resolver = self.inner.resolver.borrow_mut().take();
        drop(resolver);
        let teardown = self.inner.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
        true
    }

    /// Feed one delivery from the tree into this request.
    ///
    /// A delivery that arrives while the caller's resolver is still running
    /// (a commit triggered from inside the resolver or subscriber) is
    /// dropped, not queued. Only a `trace` event records it. The resolver
    /// sees the next delivery that arrives after it returns.
    pub(crate) fn deliver(&self, value: Option<Result<S, ProbeError>>, before_unmount: bool) {
        if self.is_settled() {
            tracing::trace!(
                name = self.name().unwrap_or("UNKNOWN"),
                before_unmount,
                "delivery discarded: request already settled"
            );
            return;
        }

        let value = match value {
            Some(Err(error)) => {
                self.settle(Err(error));
                return;
            }
            Some(Ok(value)) => Some(value),
            None => None,
        };

        if !self.inner.has_resolver {
            self.settle(Ok(value));
            return;
        }

        let Some(mut resolver) = self.inner.resolver.borrow_mut().take() else {
            tracing::trace!(
                name = self.name().unwrap_or("UNKNOWN"),
                "delivery ignored: resolver is already running"
            );
            return;
        };

        let utils = ResolverUtils {
            request: self.clone(),
            before_unmount,
        };
        resolver(value.clone(), &utils);

        if self.is_settled() {
            return;
        }
        if before_unmount && self.inner.settle_on_forced_unmount {
            tracing::debug!(
                name = self.name().unwrap_or("UNKNOWN"),
                "resolver left request pending on unmount; settling with last value"
            );
            self.settle(Ok(value));
            return;
        }
        *self.inner.resolver.borrow_mut() = Some(resolver);
    }
}

/// Controls handed to a caller resolver for one delivery.
pub struct ResolverUtils<S> {
    request: PendingRequest<S>,
    before_unmount: bool,
}

impl<S> fmt::Debug for ResolverUtils<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverUtils")
            .field("request", &self.request)
            .field("before_unmount", &self.before_unmount)
            .finish()
    }
}

impl<S: Clone + 'static> ResolverUtils<S> {
    /// Settle with a present value. Returns `false` if already settled.
    pub fn resolve(&self, value: S) -> bool {
        self.request.settle(Ok(Some(value)))
    }

    /// Settle with the absent value.
    pub fn resolve_absent(&self) -> bool {
        self.request.settle(Ok(None))
    }

    /// Settle with whatever the delivery carried.
    pub fn resolve_option(&self, value: Option<S>) -> bool {
        self.request.settle(Ok(value))
    }

    pub fn reject(&self, error: impl Into<ProbeError>) -> bool {
        self.request.settle(Err(error.into()))
    }

    /// Whether this delivery is the last one before the mount point goes
    /// away.
    #[must_use]
    pub fn is_before_unmount(&self) -> bool {
        self.before_unmount
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.request.is_settled()
    }
}

/// Future resolving once the request settles.
#[must_use = "a HookState does nothing unless awaited or polled"]
pub struct HookState<S> {
    receiver: oneshot::Receiver<HookResult<S>>,
    taken: bool,
}

impl<S> fmt::Debug for HookState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookState").finish_non_exhaustive()
    }
}

fn dropped_error() -> ProbeError {
    ProbeError::new("hook state request was dropped before it settled")
}

impl<S> HookState<S> {
    /// Take the outcome without waiting. `None` while still pending and
    /// after the outcome has been taken once.
    pub fn try_take(&mut self) -> Option<HookResult<S>> {
        if self.taken {
            return None;
        }
        let outcome = match self.receiver.try_recv() {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return None,
            Err(oneshot::Canceled) => Err(dropped_error()),
        };
        self.taken = true;
        Some(outcome)
    }
}

impl<S> Future for HookState<S> {
    type Output = HookResult<S>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(oneshot::Canceled)) => Err(dropped_error()),
            Poll::Pending => return Poll::Pending,
        };
        this.taken = true;
        Poll::Ready(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use proptest::prelude::*;

    fn request<S: Clone + 'static>(
        resolver: Option<Resolver<S>>,
    ) -> (PendingRequest<S>, HookState<S>) {
        PendingRequest::new(resolver, Some("test".to_owned()), true)
    }

    #[test]
    fn first_delivery_settles_without_resolver() {
        let (req, state) = request::<u32>(None);
        req.deliver(Some(Ok(42)), false);
        req.deliver(Some(Ok(7)), false);
        assert_eq!(state.now_or_never(), Some(Ok(Some(42))));
    }

    #[test]
    fn probe_error_rejects_before_resolver_runs() {
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        let (req, state) = request::<u32>(Some(Box::new(move |_: Option<u32>, _: &ResolverUtils<u32>| {
            r.set(true);
        })));
        req.deliver(Some(Err(ProbeError::new("boom"))), false);
        assert!(!ran.get());
        assert_eq!(state.now_or_never(), Some(Err(ProbeError::new("boom"))));
    }

    #[test]
    fn resolver_can_wait_for_a_predicate() {
        let (req, mut state) = request::<u32>(Some(Box::new(|value: Option<u32>, utils: &ResolverUtils<u32>| {
            if value.is_some_and(|v| v >= 3) {
                utils.resolve(value.unwrap_or_default());
            }
        })));
        req.deliver(Some(Ok(1)), false);
        req.deliver(Some(Ok(2)), false);
        assert!(state.try_take().is_none());
        req.deliver(Some(Ok(3)), false);
        assert_eq!(state.try_take(), Some(Ok(Some(3))));
    }

    #[test]
    fn forced_unmount_settles_pending_resolver() {
        let (req, state) = request::<u32>(Some(Box::new(|_: Option<u32>, _: &ResolverUtils<u32>| {})));
        req.deliver(Some(Ok(5)), false);
        assert!(!req.is_settled());
        req.deliver(Some(Ok(6)), true);
        assert_eq!(state.now_or_never(), Some(Ok(Some(6))));
    }

    #[test]
    fn forced_settlement_can_be_disabled() {
        let (req, mut state) = PendingRequest::<u32>::new(
            Some(Box::new(|_: Option<u32>, _: &ResolverUtils<u32>| {})),
            None,
            false,
        );
        req.deliver(Some(Ok(6)), true);
        assert!(state.try_take().is_none());
        req.settle(Ok(None));
        assert_eq!(state.try_take(), Some(Ok(None)));
    }

    #[test]
    fn teardown_runs_once_on_settle() {
        let (req, _state) = request::<u32>(None);
        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        req.set_teardown(move || r.set(r.get() + 1));
        assert!(req.settle(Ok(None)));
        assert!(!req.settle(Ok(Some(1))));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn teardown_installed_after_settle_runs_immediately() {
        let (req, _state) = request::<u32>(None);
        req.settle(Ok(None));
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        req.set_teardown(move || r.set(true));
        assert!(ran.get());
    }

    #[test]
    fn dropping_every_sender_reports_an_error() {
        let (req, state) = request::<u32>(None);
        drop(req);
        let outcome = state.now_or_never().unwrap();
        assert_eq!(
            outcome.unwrap_err().message(),
            "hook state request was dropped before it settled"
        );
    }

    #[test]
    fn reentrant_delivery_is_ignored() {
        let slot: Rc<RefCell<Option<PendingRequest<u32>>>> = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&slot);
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let (req, mut state) = request::<u32>(Some(Box::new(move |_: Option<u32>, _: &ResolverUtils<u32>| {
            c.set(c.get() + 1);
            if let Some(req) = inner.borrow().as_ref() {
                req.deliver(Some(Ok(99)), false);
            }
        })));
        *slot.borrow_mut() = Some(req.clone());
        req.deliver(Some(Ok(1)), false);
        assert_eq!(calls.get(), 1);
        assert!(state.try_take().is_none());
        slot.borrow_mut().take();
    }

    #[derive(Debug, Clone)]
    enum Step {
        Deliver(u32, bool),
        DeliverAbsent(bool),
        Resolve(u32),
        Reject,
    }

    fn arb_step() -> impl Strategy<Value = Step> {
        prop_oneof![
            4 => (any::<u32>(), any::<bool>()).prop_map(|(v, b)| Step::Deliver(v, b)),
            1 => any::<bool>().prop_map(Step::DeliverAbsent),
            1 => any::<u32>().prop_map(Step::Resolve),
            1 => Just(Step::Reject),
        ]
    }

    proptest! {
        #[test]
        fn settles_at_most_once(steps in proptest::collection::vec(arb_step(), 0..=40)) {
            let (req, mut state) = request::<u32>(Some(Box::new(
                |value: Option<u32>, utils: &ResolverUtils<u32>| {
                    if let Some(v) = value.filter(|v| v % 7 == 0) {
                        utils.resolve(v);
                    }
                },
            )));
            let teardowns = Rc::new(Cell::new(0_u32));
            let t = Rc::clone(&teardowns);
            req.set_teardown(move || t.set(t.get() + 1));

            let mut first: Option<HookResult<u32>> = None;
            let mut was_settled = false;
            for step in steps {
                match step {
                    Step::Deliver(v, before) => req.deliver(Some(Ok(v)), before),
                    Step::DeliverAbsent(before) => req.deliver(None, before),
                    Step::Resolve(v) => {
                        req.settle(Ok(Some(v)));
                    }
                    Step::Reject => {
                        req.settle(Err(ProbeError::new("rejected")));
                    }
                }
                prop_assert!(!was_settled || req.is_settled());
                was_settled = req.is_settled();
                if let Some(outcome) = state.try_take() {
                    prop_assert!(first.is_none());
                    first = Some(outcome);
                }
                prop_assert!(teardowns.get() <= 1);
            }
            prop_assert_eq!(teardowns.get() == 1, req.is_settled());
            prop_assert_eq!(first.is_some(), req.is_settled());
        }
    }
}
