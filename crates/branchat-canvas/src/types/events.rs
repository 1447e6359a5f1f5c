use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Lifecycle of one streaming request bound to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Streaming,
    Complete,
    Error,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }
}

/// Notification fanned out to every view subscribed to a node
///
/// `text` is always the full accumulated answer, so views never need to
/// reassemble deltas and all of them show identical text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub node_id: NodeId,
    pub generation: u64,
    pub text: String,
    pub state: SessionState,
}
