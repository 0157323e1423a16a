#![forbid(unsafe_code)]

//! Process-unique identifiers for channels and handlers.
//!
//! Ids are rendered as `{prefix}{unix_millis}_{suffix}` where `suffix` comes
//! from a process-wide counter. The timestamp keeps ids readable in logs; the
//! counter guarantees an id is never handed out twice, even when two ids are
//! generated within the same millisecond.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use web_time::{SystemTime, UNIX_EPOCH};

static NEXT_ID_SUFFIX: AtomicU64 = AtomicU64::new(1);

fn generate(prefix: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let suffix = NEXT_ID_SUFFIX.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}{millis}_{suffix:x}")
}

/// Identifier of a registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(String);

impl ChannelId {
    /// Allocate a fresh id with the given prefix.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        Self(generate(prefix))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a mounted handler node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(String);

impl HandlerId {
    /// Allocate a fresh id with the given prefix.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        Self(generate(prefix))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
