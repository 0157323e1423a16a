//! Lifecycle actions carried by the store's action bus.

use crate::bus::EventBus;
use crate::channel::Snapshot;
use crate::ids::{ChannelId, HandlerId};

/// Bus carrying [`Action`]s between the store, the handler and observers.
pub type ActionBus = EventBus<Action>;

#[derive(Debug, Clone)]
pub enum Action {
    /// A handler node bound itself to the store.
    BindHandler { handler_id: HandlerId },
    /// The bound handler released the store.
    UnbindHandler { handler_id: HandlerId },
    /// A channel was registered and needs a mount point.
    MountChannel {
        channel_id: ChannelId,
        name: Option<String>,
    },
    /// A channel was finalized and its mount point must go.
    UnmountChannel { channel_id: ChannelId },
    /// A mount point evaluated its probe.
    NewChannelState {
        channel_id: ChannelId,
        state: Snapshot,
    },
}

impl Action {
    /// Stable discriminant name, used in log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BindHandler { .. } => "BIND_HANDLER",
            Self::UnbindHandler { .. } => "UNBIND_HANDLER",
            Self::MountChannel { .. } => "MOUNT_CHANNEL",
            Self::UnmountChannel { .. } => "UNMOUNT_CHANNEL",
            Self::NewChannelState { .. } => "NEW_CHANNEL_STATE",
        }
    }

    /// The channel this action concerns, if any.
    #[must_use]
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            Self::MountChannel { channel_id, .. }
            | Self::UnmountChannel { channel_id }
            | Self::NewChannelState { channel_id, .. } => Some(channel_id),
            Self::BindHandler { .. } | Self::UnbindHandler { .. } => None,
        }
    }
}
