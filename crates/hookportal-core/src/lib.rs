#![forbid(unsafe_code)]

//! Core types for hookportal: lifecycle actions, the channel registry, the
//! handler binding, and the contract a host tree must satisfy.
//!
//! # Role in hookportal
//! `hookportal-core` holds the state that the bridge and the tree share. The
//! runtime crate builds the handler node, channel mount points and the
//! async bridge on top of it; the harness crate implements the host contract
//! in [`tree`] for tests.
//!
//! # Primary responsibilities
//! - **EventBus / Action**: synchronous fan-out of lifecycle events.
//! - **Store**: ordered channel registry plus single-handler binding.
//! - **Node / RenderScope / Invalidator**: the host-tree contract.
//! - **ShallowEq**: one-level equality used by selectors.
//! - **PortalConfig / PortalError**: configuration and error taxonomy.

pub mod action;
pub mod bus;
pub mod channel;
pub mod config;
pub mod error;
pub mod ids;
pub mod shallow;
pub mod store;
pub mod tree;

pub use action::{Action, ActionBus};
pub use bus::{EventBus, Subscription};
pub use channel::{Channel, ProbeFn, ProbeOutput, ResolverFn, Snapshot};
pub use config::PortalConfig;
pub use error::{PortalError, ProbeError, Result};
pub use ids::{ChannelId, HandlerId};
pub use shallow::ShallowEq;
pub use store::{ChannelHelpers, Registry, Store, WeakStore};
pub use tree::{DetachedScope, Invalidator, Node, Provided, RenderScope};
