//! Typed probes.
//!
//! A [`Probe<S>`] is a procedure that can only run inside the host tree: it
//! receives the [`RenderScope`] of the handler that hosts it and produces a
//! value of type `S`. Probes are erased into a [`ProbeFn`] before they enter
//! the channel registry.

use std::fmt;
use std::rc::Rc;

use hookportal_core::{ProbeError, ProbeFn, RenderScope, Snapshot};

type Eval<S> = Rc<dyn Fn(&dyn RenderScope) -> Result<S, ProbeError>>;

pub struct Probe<S> {
    eval: Eval<S>,
}

impl<S> Clone for Probe<S> {
    fn clone(&self) -> Self {
        Self {
            eval: Rc::clone(&self.eval),
        }
    }
}

impl<S> fmt::Debug for Probe<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("output", &std::any::type_name::<S>())
            .finish()
    }
}

impl<S: 'static> Probe<S> {
    /// Wrap an infallible probe. Panics raised while it runs are caught by
    /// the channel mount point and surface as a [`ProbeError`].
    pub fn new(probe: impl Fn(&dyn RenderScope) -> S + 'static) -> Self {
        Self {
            eval: Rc::new(move |scope: &dyn RenderScope| Ok(probe(scope))),
        }
    }

    /// Wrap a probe that reports its own failures.
    pub fn fallible(probe: impl Fn(&dyn RenderScope) -> Result<S, ProbeError> + 'static) -> Self {
        Self {
            eval: Rc::new(probe),
        }
    }

    /// Run the probe directly against `scope`.
    pub fn evaluate(&self, scope: &dyn RenderScope) -> Result<S, ProbeError> {
        (self.eval)(scope)
    }

    pub(crate) fn erase(&self) -> ProbeFn {
        let eval = Rc::clone(&self.eval);
        Rc::new(move |scope: &dyn RenderScope| eval(scope).map(|value| Rc::new(value) as Snapshot))
    }
}

/// Probe reading the nearest broadcast value of type `T`.
#[must_use]
pub fn context_probe<T: 'static>() -> Probe<Option<Rc<T>>> {
    Probe::new(|scope| scope.use_context::<T>())
}

/// Recover the typed value from an erased probe output.
pub(crate) fn downcast_snapshot<S: Clone + 'static>(
    output: Result<Snapshot, ProbeError>,
) -> Result<S, ProbeError> {
    let snapshot = output?;
    snapshot
        .downcast::<S>()
        .map(|value| Rc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone()))
        .map_err(|_| {
            ProbeError::new(format!(
                "probe output is not a {}",
                std::any::type_name::<S>()
            ))
        })
}
