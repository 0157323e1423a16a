#![forbid(unsafe_code)]

//! hookportal public facade crate.
//!
//! Re-exports the stable surface of the workspace crates. Most users only
//! need the [`prelude`].
//!
//! # Example
//!
//! ```
//! use futures::FutureExt;
//! use hookportal::prelude::*;
//! use hookportal_harness::TestTree;
//!
//! let portal = HookPortal::new();
//! let (provider, _handle) = BroadcastProvider::new(7_u32);
//!
//! let mut tree = TestTree::new();
//! let root = tree.mount_root(provider);
//! tree.mount_child(root, portal.handler()).unwrap();
//! tree.flush().unwrap();
//!
//! let state = portal.get_hook_state(|scope: &dyn RenderScope| {
//!     scope.use_context::<u32>().map_or(0, |value| *value)
//! });
//! tree.flush().unwrap();
//! assert_eq!(state.now_or_never(), Some(Ok(Some(7))));
//! ```

pub use hookportal_core as core;
#[cfg(feature = "harness")]
pub use hookportal_harness as harness;
#[cfg(feature = "runtime")]
pub use hookportal_runtime as runtime;

pub mod prelude {
    pub use hookportal_core::{
        Action, ChannelId, HandlerId, Invalidator, Node, PortalConfig, PortalError, ProbeError,
        RenderScope, ShallowEq, Store,
    };

    #[cfg(feature = "runtime")]
    pub use hookportal_runtime::{
        BroadcastProvider, ConfigStore, ContextSelector, HookPortal, HookState, HookSubscription,
        HooksHandler, Probe, ProviderHandle, Resolver, ResolverUtils, create_context_selector,
    };
}
