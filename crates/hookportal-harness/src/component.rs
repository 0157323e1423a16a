//! Closure-backed nodes for tests.

use std::fmt;

use hookportal_core::{Node, RenderScope, Result};

type RenderFn = Box<dyn FnMut(&dyn RenderScope)>;
type HookFn = Box<dyn FnMut()>;

/// A [`Node`] whose lifecycle is a set of closures.
pub struct FnComponent {
    render: RenderFn,
    commit: Option<HookFn>,
    cleanup: Option<HookFn>,
}

impl fmt::Debug for FnComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnComponent")
            .field("on_commit", &self.commit.is_some())
            .field("on_cleanup", &self.cleanup.is_some())
            .finish_non_exhaustive()
    }
}

impl FnComponent {
    pub fn new(render: impl FnMut(&dyn RenderScope) + 'static) -> Self {
        Self {
            render: Box::new(render),
            commit: None,
            cleanup: None,
        }
    }

    /// A component that renders nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(|_: &dyn RenderScope| {})
    }

    #[must_use]
    pub fn on_commit(mut self, commit: impl FnMut() + 'static) -> Self {
        self.commit = Some(Box::new(commit));
        self
    }

    #[must_use]
    pub fn on_cleanup(mut self, cleanup: impl FnMut() + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }
}

impl Node for FnComponent {
    fn render(&mut self, scope: &dyn RenderScope) {
        (self.render)(scope);
    }

    fn commit(&mut self) -> Result<()> {
        if let Some(commit) = self.commit.as_mut() {
            commit();
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        if let Some(cleanup) = self.cleanup.as_mut() {
            cleanup();
        }
        Ok(())
    }
}
