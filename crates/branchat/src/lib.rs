//! # Branchat
//!
//! Branching AI conversations laid out as a graph.
//!
//! Every question is a node. Follow-ups hang off the node they continue,
//! uploaded files become nodes that feed an analysis conversation, and
//! answers stream into their node while any number of views watch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use branchat::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let canvas = Canvas::builder()
//!         .registry(ClientFactory::registry_from_env())
//!         .build()?;
//!
//!     let session = canvas.ask_initial("What is a DAG?", ModelSelection::default())?;
//!     let mut card = canvas.subscribe(session.node_id());
//!
//!     while let Some(update) = card.recv().await {
//!         println!("{}", update.text);
//!         if update.state.is_terminal() {
//!             break;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`branchat-llm`**: provider catalogue and OpenAI-compatible streaming client
//! - **`branchat-canvas`**: layout engine, graph store, streaming sessions and
//!   the `Canvas` orchestrator
//!
//! ## License
//!
//! MIT

pub mod prelude;

pub use branchat_canvas::{
    Canvas, CanvasBuilder, CanvasConfig, CanvasError, CanvasSnapshot, LayoutConfig,
    Node, NodeId, NodeKind, Edge, FileInfo, Position,
    SessionHandle, SessionOutcome, SessionState, SessionUpdate, Subscription,
    FileReader, FileUpload, FsFileReader, IngestOutcome,
};

pub use branchat_llm::{
    ChatClient, ChatError, ChatRequest, ChatOptions, OpenAIClient,
    Message, Role, StreamEvent,
    ProviderId, ProviderConfig, ModelSelection, ProviderRegistry, ClientFactory,
};
