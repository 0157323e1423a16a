use std::any::Any;

use thiserror::Error;

use crate::ids::HandlerId;

pub type Result<T> = std::result::Result<T, PortalError>;

/// Normalized failure raised while evaluating a probe.
///
/// Whatever shape the failure had (a `&str` or `String` panic payload, an
/// arbitrary payload, or an explicit error from a fallible probe), it is
/// reduced to a single message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProbeError {
    message: String,
}

impl ProbeError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Normalize a panic payload caught around a probe evaluation.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_owned(),
                Err(_) => "probe panicked with a non-string payload".to_owned(),
            },
        };
        Self { message }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for ProbeError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ProbeError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    #[error("cannot add a channel: no handler is bound to this store")]
    NotBound,

    #[error("a handler is already bound to this store: {bound}")]
    AlreadyBound { bound: HandlerId },

    #[error("cannot unbind handler {got}: it is not the bound handler")]
    InvalidHandler {
        expected: Option<HandlerId>,
        got: HandlerId,
    },

    #[error("probe evaluation failed: {0}")]
    Probe(#[from] ProbeError),
}
