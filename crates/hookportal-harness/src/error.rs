use hookportal_core::PortalError;
use thiserror::Error;

use crate::tree::NodeId;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error("render loop did not settle after {passes} passes")]
    RenderLoop { passes: usize },

    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
}
