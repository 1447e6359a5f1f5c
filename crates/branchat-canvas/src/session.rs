//! Streaming sessions bound to nodes.
//!
//! Each session runs as its own tokio task and owns the answer fields of its
//! node while it runs. Starting a session for a node that already has one
//! supersedes it: the old task is aborted and its generation retired, so a
//! chunk that races the abort is dropped instead of reaching the node.
//!
//! Lock order is sessions, then store, then hub. No lock is held across an
//! await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use branchat_llm::{ChatClient, ChatError, ChatOptions, ChatRequest, Message, ModelSelection, ProviderRegistry, StreamEvent};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};

use crate::error::{CanvasError, Result};
use crate::store::SharedStore;
use crate::subscription::SubscriptionHub;
use crate::types::{NodeId, SessionState, SessionUpdate};

/// How a session ended, when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Full answer text
    Completed(String),
    /// Superseded, cancelled, or its node was removed
    Cancelled,
}

/// Awaitable end of a started session. Dropping it detaches the session.
#[derive(Debug)]
pub struct SessionHandle {
    node_id: NodeId,
    generation: u64,
    join: JoinHandle<Result<SessionOutcome>>,
}

impl SessionHandle {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the session to settle. A failed stream is returned as
    /// [`CanvasError::StreamFailure`] after it has been recorded on the node.
    pub async fn wait(self) -> Result<SessionOutcome> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Ok(SessionOutcome::Cancelled),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

/// Request a session was started with, kept for retries
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub messages: Vec<Message>,
    pub model: ModelSelection,
}

struct SessionEntry {
    generation: u64,
    state: SessionState,
    accumulated: String,
    request: SessionRequest,
    abort: AbortHandle,
}

/// Why a running session stopped early
enum Halt {
    /// The session no longer owns its node
    Superseded,
    Failed(ChatError),
}

impl From<ChatError> for Halt {
    fn from(err: ChatError) -> Self {
        Halt::Failed(err)
    }
}

struct Shared {
    store: SharedStore,
    hub: SubscriptionHub,
    sessions: Mutex<HashMap<NodeId, SessionEntry>>,
    pending_text: String,
    error_prefix: String,
}

pub struct SessionManager {
    registry: ProviderRegistry,
    options: ChatOptions,
    shared: Arc<Shared>,
    next_generation: AtomicU64,
}

impl SessionManager {
    pub fn new(
        registry: ProviderRegistry,
        store: SharedStore,
        hub: SubscriptionHub,
        pending_text: impl Into<String>,
        error_prefix: impl Into<String>,
        options: ChatOptions,
    ) -> Self {
        Self {
            registry,
            options,
            shared: Arc::new(Shared {
                store,
                hub,
                sessions: Mutex::new(HashMap::new()),
                pending_text: pending_text.into(),
                error_prefix: error_prefix.into(),
            }),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Start streaming an answer into `node_id`, superseding any session
    /// already running for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, node_id: &str, messages: Vec<Message>, model: ModelSelection) -> SessionHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let client = self.registry.get(model.provider);
        let request =
            ChatRequest::new(model.model.clone(), messages.clone()).with_options(self.options.clone());

        let mut sessions = self.shared.sessions.lock();

        if let Some(previous) = sessions.get(node_id) {
            if !previous.state.is_terminal() {
                previous.abort.abort();
                self.shared.hub.publish(&SessionUpdate {
                    node_id: node_id.to_string(),
                    generation: previous.generation,
                    text: previous.accumulated.clone(),
                    state: SessionState::Cancelled,
                });
                tracing::warn!(
                    node_id,
                    superseded = previous.generation,
                    generation,
                    "session superseded"
                );
            }
        }

        // The task blocks on the sessions lock until its entry exists
        let join = tokio::spawn(run_session(
            Arc::clone(&self.shared),
            node_id.to_string(),
            generation,
            client,
            request,
        ));

        sessions.insert(
            node_id.to_string(),
            SessionEntry {
                generation,
                state: SessionState::Pending,
                accumulated: String::new(),
                request: SessionRequest { messages, model: model.clone() },
                abort: join.abort_handle(),
            },
        );

        self.shared
            .store
            .lock()
            .set_response(node_id, &self.shared.pending_text, false);

        self.shared.hub.publish(&SessionUpdate {
            node_id: node_id.to_string(),
            generation,
            text: self.shared.pending_text.clone(),
            state: SessionState::Pending,
        });

        tracing::info!(node_id, generation, model = %model, "session started");

        SessionHandle {
            node_id: node_id.to_string(),
            generation,
            join,
        }
    }

    /// Stop the running session of `node_id`. Returns whether one was running.
    ///
    /// The node keeps whatever text had arrived, and nothing else: a session
    /// cancelled before its first chunk leaves an empty response.
    pub fn cancel(&self, node_id: &str) -> bool {
        let mut sessions = self.shared.sessions.lock();
        match sessions.get_mut(node_id) {
            Some(entry) if !entry.state.is_terminal() => {
                entry.abort.abort();
                entry.state = SessionState::Cancelled;
                self.shared
                    .store
                    .lock()
                    .set_response(node_id, &entry.accumulated, false);
                let update = SessionUpdate {
                    node_id: node_id.to_string(),
                    generation: entry.generation,
                    text: entry.accumulated.clone(),
                    state: SessionState::Cancelled,
                };
                self.shared.hub.publish(&update);
                tracing::info!(node_id, generation = entry.generation, "session cancelled");
                true
            }
            _ => false,
        }
    }

    /// Cancel and forget everything about `node_id`
    pub fn discard(&self, node_id: &str) {
        self.cancel(node_id);
        self.shared.sessions.lock().remove(node_id);
    }

    /// Cancel every running session
    pub fn cancel_all(&self) -> usize {
        let running: Vec<NodeId> = self
            .shared
            .sessions
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.state.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();

        running.iter().filter(|id| self.cancel(id)).count()
    }

    /// State of the latest session for `node_id`
    pub fn state(&self, node_id: &str) -> Option<SessionState> {
        self.shared.sessions.lock().get(node_id).map(|entry| entry.state)
    }

    /// Request of the latest session for `node_id`
    pub fn last_request(&self, node_id: &str) -> Option<SessionRequest> {
        self.shared
            .sessions
            .lock()
            .get(node_id)
            .map(|entry| entry.request.clone())
    }

    pub fn running(&self) -> usize {
        self.shared
            .sessions
            .lock()
            .values()
            .filter(|entry| !entry.state.is_terminal())
            .count()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        for entry in self.shared.sessions.lock().values() {
            entry.abort.abort();
        }
    }
}

async fn run_session(
    shared: Arc<Shared>,
    node_id: NodeId,
    generation: u64,
    client: branchat_llm::Result<Arc<dyn ChatClient>>,
    request: ChatRequest,
) -> Result<SessionOutcome> {
    match stream_into(&shared, &node_id, generation, client, request).await {
        Ok(()) => Ok(shared
            .complete(&node_id, generation)
            .map(SessionOutcome::Completed)
            .unwrap_or(SessionOutcome::Cancelled)),
        Err(Halt::Superseded) => Ok(SessionOutcome::Cancelled),
        Err(Halt::Failed(err)) => {
            if shared.fail(&node_id, generation, &err) {
                Err(CanvasError::StreamFailure { node_id, source: err })
            } else {
                Ok(SessionOutcome::Cancelled)
            }
        }
    }
}

async fn stream_into(
    shared: &Shared,
    node_id: &str,
    generation: u64,
    client: branchat_llm::Result<Arc<dyn ChatClient>>,
    request: ChatRequest,
) -> std::result::Result<(), Halt> {
    let mut stream = client?.chat_stream(request).await?;

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Message { content } => shared.apply_chunk(node_id, generation, &content)?,
            StreamEvent::Done { .. } => break,
        }
    }

    Ok(())
}

impl Shared {
    fn apply_chunk(&self, node_id: &str, generation: u64, chunk: &str) -> std::result::Result<(), Halt> {
        let mut sessions = self.sessions.lock();
        let entry = match sessions.get_mut(node_id) {
            Some(entry) if entry.generation == generation && !entry.state.is_terminal() => entry,
            _ => return Err(Halt::Superseded),
        };

        entry.accumulated.push_str(chunk);

        if !self.store.lock().set_response(node_id, &entry.accumulated, false) {
            entry.state = SessionState::Cancelled;
            tracing::debug!(node_id, generation, "node removed, stopping session");
            self.hub.publish(&SessionUpdate {
                node_id: node_id.to_string(),
                generation,
                text: entry.accumulated.clone(),
                state: SessionState::Cancelled,
            });
            return Err(Halt::Superseded);
        }

        entry.state = SessionState::Streaming;
        self.hub.publish(&SessionUpdate {
            node_id: node_id.to_string(),
            generation,
            text: entry.accumulated.clone(),
            state: SessionState::Streaming,
        });

        Ok(())
    }

    fn complete(&self, node_id: &str, generation: u64) -> Option<String> {
        let mut sessions = self.sessions.lock();
        let entry = sessions
            .get_mut(node_id)
            .filter(|entry| entry.generation == generation && !entry.state.is_terminal())?;

        let committed = self.store.lock().set_response(node_id, &entry.accumulated, false);
        entry.state = if committed {
            SessionState::Complete
        } else {
            SessionState::Cancelled
        };

        self.hub.publish(&SessionUpdate {
            node_id: node_id.to_string(),
            generation,
            text: entry.accumulated.clone(),
            state: entry.state,
        });

        if !committed {
            return None;
        }

        tracing::info!(node_id, generation, chars = entry.accumulated.len(), "session complete");
        Some(entry.accumulated.clone())
    }

    /// Record `err` on the node; false when the session no longer owns it
    fn fail(&self, node_id: &str, generation: u64, err: &ChatError) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(entry) = sessions
            .get_mut(node_id)
            .filter(|entry| entry.generation == generation && !entry.state.is_terminal())
        else {
            return false;
        };

        let message = format!("{}: {}", self.error_prefix, err);
        if !self.store.lock().set_response(node_id, &message, true) {
            entry.state = SessionState::Cancelled;
            return false;
        }

        entry.state = SessionState::Error;
        self.hub.publish(&SessionUpdate {
            node_id: node_id.to_string(),
            generation,
            text: message,
            state: SessionState::Error,
        });

        tracing::warn!(node_id, generation, error = %err, "session failed");
        true
    }
}
