#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use branchat_canvas::{CanvasError, FileInfo, FileReader, FileUpload, SessionUpdate, Subscription};
use branchat_llm::{ChatClient, ChatError, ChatRequest, ChatResponse, EventStream, StreamEvent};
use chrono::Utc;
use futures::channel::mpsc as stream_channel;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

const WAIT: Duration = Duration::from_secs(2);

/// Chat client whose streams are driven by the test, one [`Feed`] per request
pub struct ControlledClient {
    opened: mpsc::UnboundedSender<Feed>,
    requests: Mutex<Vec<ChatRequest>>,
}

/// Receives a [`Feed`] for every stream the client opens
pub struct Feeds {
    rx: mpsc::UnboundedReceiver<Feed>,
}

/// Test side of one open stream
pub struct Feed {
    pub request: ChatRequest,
    tx: stream_channel::UnboundedSender<branchat_llm::Result<StreamEvent>>,
}

pub fn controlled_client() -> (Arc<ControlledClient>, Feeds) {
    let (opened, rx) = mpsc::unbounded_channel();
    let client = ControlledClient {
        opened,
        requests: Mutex::new(Vec::new()),
    };
    (Arc::new(client), Feeds { rx })
}

impl ControlledClient {
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatClient for ControlledClient {
    async fn chat(&self, _request: ChatRequest) -> branchat_llm::Result<ChatResponse> {
        Err(ChatError::Provider("controlled client only streams".to_string()))
    }

    async fn chat_stream(&self, request: ChatRequest) -> branchat_llm::Result<EventStream> {
        self.requests.lock().push(request.clone());
        let (tx, rx) = stream_channel::unbounded();
        let _ = self.opened.send(Feed { request, tx });
        Ok(Box::pin(rx))
    }
}

impl Feeds {
    /// The next stream opened by a session
    pub async fn next(&mut self) -> Feed {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("no stream was opened")
            .expect("client dropped")
    }
}

impl Feed {
    /// Send a content delta; false once the session has let go of the stream
    pub fn chunk(&self, text: &str) -> bool {
        self.tx
            .unbounded_send(Ok(StreamEvent::Message { content: text.to_string() }))
            .is_ok()
    }

    pub fn fail(&self, err: ChatError) -> bool {
        self.tx.unbounded_send(Err(err)).is_ok()
    }

    /// End the stream with a done marker
    pub fn finish(self) {
        let _ = self.tx.unbounded_send(Ok(StreamEvent::Done {
            finish_reason: Some("stop".to_string()),
        }));
    }

    pub fn last_user_turn(&self) -> &str {
        self.request.messages.last().map(|m| m.content()).unwrap_or_default()
    }
}

/// Every request fails with an HTTP 500
pub struct FailingClient;

#[async_trait]
impl ChatClient for FailingClient {
    async fn chat(&self, _request: ChatRequest) -> branchat_llm::Result<ChatResponse> {
        Err(server_error())
    }

    async fn chat_stream(&self, _request: ChatRequest) -> branchat_llm::Result<EventStream> {
        Err(server_error())
    }
}

pub fn server_error() -> ChatError {
    ChatError::Http {
        status: 500,
        body: "internal error".to_string(),
    }
}

/// In-memory files, keyed by upload name
#[derive(Default)]
pub struct MemoryFileReader {
    files: HashMap<String, Result<String, String>>,
    gates: HashMap<String, Arc<Notify>>,
}

impl MemoryFileReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: &str, content: &str) -> Self {
        self.files.insert(name.to_string(), Ok(content.to_string()));
        self
    }

    pub fn with_failure(mut self, name: &str, reason: &str) -> Self {
        self.files.insert(name.to_string(), Err(reason.to_string()));
        self
    }

    /// Hold the read of `name` until the returned gate is opened
    pub fn gated(&mut self, name: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.insert(name.to_string(), gate.clone());
        gate
    }
}

#[async_trait]
impl FileReader for MemoryFileReader {
    async fn read(&self, upload: &FileUpload) -> branchat_canvas::Result<FileInfo> {
        if let Some(gate) = self.gates.get(&upload.name) {
            gate.notified().await;
        }

        let content = match self.files.get(&upload.name) {
            Some(Ok(content)) => content.clone(),
            Some(Err(reason)) => {
                return Err(CanvasError::ReadFailure {
                    name: upload.name.clone(),
                    reason: reason.clone(),
                })
            }
            None => {
                return Err(CanvasError::ReadFailure {
                    name: upload.name.clone(),
                    reason: "not found".to_string(),
                })
            }
        };

        Ok(FileInfo {
            name: upload.name.clone(),
            size: content.len() as u64,
            mime: upload.mime.clone(),
            uploaded_at: Utc::now(),
            content,
        })
    }
}

pub fn upload(name: &str) -> FileUpload {
    FileUpload::new(name, "text/plain", format!("/uploads/{}", name))
}

/// Next update on `subscription`, failing the test after a timeout
pub async fn next_update(subscription: &mut Subscription) -> SessionUpdate {
    tokio::time::timeout(WAIT, subscription.recv())
        .await
        .expect("no update arrived")
        .expect("subscription closed")
}

/// Let spawned tasks run until they block
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
