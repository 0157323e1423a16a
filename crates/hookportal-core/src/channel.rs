//! Channel records: a probe, its resolver and an id.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::ProbeError;
use crate::ids::ChannelId;
use crate::tree::RenderScope;

/// Type-erased probe output.
pub type Snapshot = Rc<dyn Any>;

/// Result of one probe evaluation.
pub type ProbeOutput = Result<Snapshot, ProbeError>;

/// Type-erased probe, evaluated inside the host tree.
pub type ProbeFn = Rc<dyn Fn(&dyn RenderScope) -> ProbeOutput>;

/// Receives every delivery for a channel: the latest output (absent when the
/// channel never rendered) and whether the mount point is about to go away.
pub type ResolverFn = Rc<dyn Fn(Option<ProbeOutput>, bool)>;

/// A registered association between a probe, an id and a resolver.
#[derive(Clone)]
pub struct Channel {
    id: ChannelId,
    probe: ProbeFn,
    resolver: ResolverFn,
    name: Option<String>,
}

impl Channel {
    pub(crate) fn new(
        id: ChannelId,
        probe: ProbeFn,
        resolver: ResolverFn,
        name: Option<String>,
    ) -> Self {
        Self {
            id,
            probe,
            resolver,
            name,
        }
    }

    #[must_use]
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Run the probe. A panic inside the probe is caught and normalized into
    /// a [`ProbeError`].
    pub fn evaluate(&self, scope: &dyn RenderScope) -> ProbeOutput {
        panic::catch_unwind(AssertUnwindSafe(|| (self.probe)(scope))).unwrap_or_else(|payload| {
            let error = ProbeError::from_panic(payload);
            tracing::warn!(
                channel_id = %self.id,
                name = self.name.as_deref().unwrap_or("UNKNOWN"),
                error = %error,
                "probe panicked during evaluation"
            );
            Err(error)
        })
    }

    /// Hand `output` to the resolver.
    pub fn deliver(&self, output: Option<ProbeOutput>, before_unmount: bool) {
        tracing::trace!(
            channel_id = %self.id,
            before_unmount,
            has_output = output.is_some(),
            "channel delivery"
        );
        (self.resolver)(output, before_unmount);
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DetachedScope;
    use std::cell::RefCell;

    fn channel(probe: ProbeFn, resolver: ResolverFn) -> Channel {
        Channel::new(ChannelId::generate("test_"), probe, resolver, None)
    }

    #[test]
    fn evaluate_returns_snapshot() {
        let ch = channel(Rc::new(|_: &dyn RenderScope| Ok(Rc::new(42_i32) as Snapshot)), Rc::new(|_, _| {}));
        let out = ch.evaluate(&DetachedScope).unwrap();
        assert_eq!(out.downcast_ref::<i32>(), Some(&42));
    }

    #[test]
    fn evaluate_catches_panics() {
        let ch = channel(
            Rc::new(|_: &dyn RenderScope| -> ProbeOutput { panic!("form context missing") }),
            Rc::new(|_, _| {}),
        );
        let err = ch.evaluate(&DetachedScope).unwrap_err();
        assert_eq!(err.message(), "form context missing");
    }

    #[test]
    fn deliver_forwards_flag() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let ch = channel(
            Rc::new(|_: &dyn RenderScope| Ok(Rc::new(()) as Snapshot)),
            Rc::new(move |out, before| s.borrow_mut().push((out.is_some(), before))),
        );
        ch.deliver(None, true);
        ch.deliver(Some(Ok(Rc::new(1_u8))), false);
        assert_eq!(*seen.borrow(), vec![(false, true), (true, false)]);
    }
}
