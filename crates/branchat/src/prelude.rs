//! Prelude module for convenient imports
//!
//! Import everything you need with:
//! ```rust
//! use branchat::prelude::*;
//! ```

pub use crate::{
    Canvas, CanvasBuilder, CanvasConfig, CanvasError, CanvasSnapshot,
    SessionHandle, SessionOutcome, SessionState, SessionUpdate, Subscription,
    FileUpload, IngestOutcome,
    ChatClient, Message, ProviderId, ModelSelection, ProviderRegistry, ClientFactory,
};
