#![forbid(unsafe_code)]

//! Runtime pieces of hookportal: the handler node, channel mount points, the
//! Hook Portal bridge, context selectors and the config store.
//!
//! # Role in hookportal
//! Everything here sits on top of `hookportal-core`. The handler and mount
//! points are host [`Node`](hookportal_core::Node)s; the portal turns their
//! deliveries into [`HookState`] futures and [`HookSubscription`]s.
//!
//! # How it fits in the system
//! Mount the [`HooksHandler`] returned by [`HookPortal::handler`] as the first
//! child under the provider whose broadcast values your probes read. After
//! the first commit, imperative code can call
//! [`HookPortal::get_hook_state`] and await the result.

pub mod config_store;
pub mod handler;
pub mod mount_point;
pub mod portal;
pub mod probe;
pub mod request;
pub mod selector;

pub use config_store::{ConfigEvent, ConfigSelection, ConfigStore};
pub use handler::HooksHandler;
pub use mount_point::ChannelMountPoint;
pub use portal::{HookPortal, HookSubscription};
pub use probe::{Probe, context_probe};
pub use request::{HookResult, HookState, Resolver, ResolverUtils};
pub use selector::{
    BroadcastProvider, ContextSelector, ProviderHandle, Selection, SourceAccessor,
    create_context_selector,
};
