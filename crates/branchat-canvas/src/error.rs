use branchat_llm::ChatError;
use thiserror::Error;

use crate::types::NodeId;

#[derive(Error, Debug)]
pub enum CanvasError {
    #[error("Node id already exists: {0}")]
    DuplicateId(NodeId),

    #[error("Edge endpoint does not exist: {0}")]
    UnknownEndpoint(NodeId),

    #[error("Edge {source_id} -> {target_id} would create a cycle")]
    CycleDetected { source_id: NodeId, target_id: NodeId },

    #[error("Node not found: {0}")]
    UnknownNode(NodeId),

    #[error("Node {0} already has a question")]
    NotBlank(NodeId),

    #[error("Node {0} has no question to ask")]
    NothingToAsk(NodeId),

    #[error("Failed to read {name}: {reason}")]
    ReadFailure { name: String, reason: String },

    #[error("Streaming failed for node {node_id}: {source}")]
    StreamFailure {
        node_id: NodeId,
        #[source]
        source: ChatError,
    },
}

pub type Result<T> = std::result::Result<T, CanvasError>;
