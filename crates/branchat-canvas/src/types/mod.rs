pub mod config;
pub mod events;
pub mod node;

pub use config::{CanvasConfig, LayoutConfig};
pub use events::{SessionState, SessionUpdate};
pub use node::{Edge, FileInfo, Node, NodeId, NodeKind, Position};
