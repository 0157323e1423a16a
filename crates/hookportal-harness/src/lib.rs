#![forbid(unsafe_code)]

//! Reference host tree for hookportal.
//!
//! [`TestTree`] implements the host contract (`Node`, `RenderScope`,
//! `Invalidator`) deterministically and in-process, so the handler, the
//! bridge and selectors can be exercised without a UI framework.
//! [`FnComponent`] builds ad-hoc nodes from closures.

pub mod component;
pub mod error;
pub mod tree;

pub use component::FnComponent;
pub use error::{HarnessError, Result};
pub use tree::{DEFAULT_MAX_PASSES, NodeId, TestTree};
