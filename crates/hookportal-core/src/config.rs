//! Store-level configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default prefix for generated channel ids.
pub const DEFAULT_CHANNEL_ID_PREFIX: &str = "ChannelId__";

/// Default prefix for generated handler ids.
pub const DEFAULT_HANDLER_ID_PREFIX: &str = "HandlerId__";

/// Configuration shared by a store and every bridge built on it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PortalConfig {
    /// Prefix for channel ids (`{prefix}{unix_millis}_{suffix}`).
    pub channel_id_prefix: String,

    /// Prefix for handler ids.
    pub handler_id_prefix: String,

    /// Settle a request with the delivered value when a custom resolver left
    /// it pending on a pre-removal delivery.
    ///
    /// When disabled, a resolver that ignores the pre-removal delivery leaves
    /// the request pending until its channel is dropped, at which point the
    /// caller's future reports the request as dropped.
    pub settle_on_forced_unmount: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            channel_id_prefix: DEFAULT_CHANNEL_ID_PREFIX.to_owned(),
            handler_id_prefix: DEFAULT_HANDLER_ID_PREFIX.to_owned(),
            settle_on_forced_unmount: true,
        }
    }
}

impl PortalConfig {
    #[must_use]
    pub fn with_channel_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_id_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_handler_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.handler_id_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_settle_on_forced_unmount(mut self, enabled: bool) -> Self {
        self.settle_on_forced_unmount = enabled;
        self
    }
}
