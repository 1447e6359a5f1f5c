use branchat_llm::ModelSelection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque node identity
pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Metadata and captured content of an uploaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mime: String,
    pub uploaded_at: DateTime<Utc>,
    /// UTF-8 text for textual files, a `data:` URL otherwise
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Conversation,
    File(FileInfo),
}

/// One question/answer card or uploaded file on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    /// The question asked at this node (empty for blank cards and files)
    pub content: String,
    /// Streamed answer, or a user-facing message when `error` is set
    pub response: String,
    pub error: bool,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSelection>,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
}

impl Node {
    pub fn conversation(label: impl Into<String>, content: impl Into<String>, position: Position) -> Self {
        Self {
            id: new_node_id("chat"),
            kind: NodeKind::Conversation,
            label: label.into(),
            content: content.into(),
            response: String::new(),
            error: false,
            position,
            model: None,
            selected: false,
            created_at: Utc::now(),
        }
    }

    pub fn file(info: FileInfo, position: Position) -> Self {
        Self {
            id: new_node_id("file"),
            kind: NodeKind::File(info),
            label: "File".to_string(),
            content: String::new(),
            response: String::new(),
            error: false,
            position,
            model: None,
            selected: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_model(mut self, model: ModelSelection) -> Self {
        self.model = Some(model);
        self
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        match &self.kind {
            NodeKind::File(info) => Some(info),
            NodeKind::Conversation => None,
        }
    }

    pub fn is_conversation(&self) -> bool {
        matches!(self.kind, NodeKind::Conversation)
    }

    /// A conversation card with no question yet
    pub fn is_blank(&self) -> bool {
        self.is_conversation() && self.content.is_empty()
    }
}

fn new_node_id(prefix: &str) -> NodeId {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Directed "used as context for" relation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: Self::id_for(&source, &target),
            source,
            target,
        }
    }

    pub fn id_for(source: &str, target: &str) -> String {
        format!("e{}-{}", source, target)
    }
}
