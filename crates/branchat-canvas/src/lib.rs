pub mod types;
pub mod error;
pub mod layout;
pub mod store;
pub mod subscription;
pub mod history;
pub mod session;
pub mod files;
pub mod canvas;
pub mod builder;

pub use types::{
    CanvasConfig, LayoutConfig,
    Node, NodeId, NodeKind, Edge, FileInfo, Position,
    SessionState, SessionUpdate,
};

pub use error::{CanvasError, Result};
pub use layout::LayoutEngine;
pub use store::{GraphStore, SharedStore};
pub use subscription::{Subscription, SubscriptionHub};
pub use history::HistoryBuilder;
pub use session::{SessionHandle, SessionManager, SessionOutcome, SessionRequest};
pub use files::{FileReader, FileUpload, FsFileReader};
pub use canvas::{Canvas, CanvasSnapshot, IngestOutcome};
pub use builder::CanvasBuilder;
