//! The conversation orchestrator.
//!
//! Every operation validates against the store first and mutates it in one
//! critical section, so a rejected call leaves nothing behind. Sessions are
//! started only after the store lock is released.

use std::sync::Arc;

use branchat_llm::{ModelSelection, ProviderRegistry};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::builder::CanvasBuilder;
use crate::error::{CanvasError, Result};
use crate::files::{FileReader, FileUpload};
use crate::history::HistoryBuilder;
use crate::layout::LayoutEngine;
use crate::session::{SessionHandle, SessionManager};
use crate::store::{GraphStore, SharedStore};
use crate::subscription::{Subscription, SubscriptionHub};
use crate::types::{CanvasConfig, Edge, FileInfo, Node, NodeId, SessionState};

const ANCHOR_LABEL_CHARS: usize = 20;

/// Nodes, edges and selection at one point in time, for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub selected: Option<NodeId>,
}

/// What an upload batch produced
#[derive(Debug)]
pub struct IngestOutcome {
    /// File nodes, in upload order of the reads that succeeded
    pub file_nodes: Vec<NodeId>,
    /// Session of the synthesized analysis node; `None` when no read succeeded
    pub session: Option<SessionHandle>,
    /// One `ReadFailure` per dropped file
    pub failures: Vec<CanvasError>,
}

impl IngestOutcome {
    pub fn conversation_node(&self) -> Option<&str> {
        self.session.as_ref().map(SessionHandle::node_id)
    }
}

pub struct Canvas {
    store: SharedStore,
    hub: SubscriptionHub,
    sessions: SessionManager,
    layout: LayoutEngine,
    history: HistoryBuilder,
    files: Arc<dyn FileReader>,
    config: CanvasConfig,
}

impl Canvas {
    pub fn new(registry: ProviderRegistry, files: Arc<dyn FileReader>, config: CanvasConfig) -> Self {
        let store = GraphStore::new().shared();
        let hub = SubscriptionHub::new();
        let sessions = SessionManager::new(
            registry,
            store.clone(),
            hub.clone(),
            config.pending_text.clone(),
            config.error_prefix.clone(),
            config.chat_options.clone(),
        );

        Self {
            store,
            hub,
            sessions,
            layout: LayoutEngine::new(config.layout.clone()),
            history: HistoryBuilder::new(config.system_prompt.clone()),
            files,
            config,
        }
    }

    pub fn builder() -> CanvasBuilder {
        CanvasBuilder::new()
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    /// Ask a root question on a new unattached node
    pub fn ask_initial(&self, question: &str, model: ModelSelection) -> Result<SessionHandle> {
        let node_id = {
            let mut store = self.store.lock();
            let position = self.layout.place(&store.positions(), None);
            let label = format!("Initial question ({})", provider_name(&model));
            let node = Node::conversation(label, question, position).with_model(model.clone());
            let node_id = node.id.clone();

            store.add_node(node)?;
            store.select(Some(node_id.as_str()))?;
            node_id
        };

        tracing::info!(node_id = %node_id, provider = %model.provider, "initial question asked");
        Ok(self.sessions.start(&node_id, self.history.initial(question), model))
    }

    /// Ask a question that continues from `parent_id`, optionally about a
    /// piece of its answer
    pub fn ask_follow_up(
        &self,
        parent_id: &str,
        question: &str,
        anchor: Option<&str>,
        model: ModelSelection,
    ) -> Result<SessionHandle> {
        let (node_id, messages) = {
            let mut store = self.store.lock();
            let parent = store
                .node(parent_id)
                .ok_or_else(|| CanvasError::UnknownEndpoint(parent_id.to_string()))?;

            let messages = self.history.follow_up(parent, question, anchor);
            let position = self.layout.place(&store.positions(), Some(parent.position));
            let node = Node::conversation(follow_up_label(anchor, &model), question, position)
                .with_model(model.clone());
            let node_id = node.id.clone();

            store.add_node(node)?;
            if let Err(e) = store.add_edge(parent_id, &node_id) {
                store.remove_node(&node_id)?;
                return Err(e);
            }
            store.select(Some(node_id.as_str()))?;
            (node_id, messages)
        };

        tracing::info!(
            node_id = %node_id,
            parent_id,
            anchored = anchor.is_some(),
            provider = %model.provider,
            "follow-up asked"
        );
        Ok(self.sessions.start(&node_id, messages, model))
    }

    /// Place an empty, selected card with no session
    pub fn create_blank_node(&self) -> Result<NodeId> {
        let mut store = self.store.lock();
        let position = self.layout.place(&store.positions(), None);
        let node = Node::conversation("Blank card", "", position);
        let node_id = node.id.clone();

        store.add_node(node)?;
        store.select(Some(node_id.as_str()))?;

        tracing::info!(node_id = %node_id, "blank card created");
        Ok(node_id)
    }

    /// Fill in the question of a blank card and answer it from its inputs
    pub fn ask_blank(&self, node_id: &str, question: &str, model: ModelSelection) -> Result<SessionHandle> {
        let messages = {
            let mut store = self.store.lock();
            store.set_question(node_id, question, model.clone())?;
            let inputs = store.inputs_of(node_id);
            self.history.from_inputs(&inputs, question)
        };

        tracing::info!(node_id, provider = %model.provider, "blank card asked");
        Ok(self.sessions.start(node_id, messages, model))
    }

    /// Start a fresh session for an existing question, with the node's
    /// current model
    pub fn retry(&self, node_id: &str) -> Result<SessionHandle> {
        let previous = self.sessions.last_request(node_id);

        let (messages, model) = {
            let store = self.store.lock();
            let node = store
                .node(node_id)
                .ok_or_else(|| CanvasError::UnknownNode(node_id.to_string()))?;
            if !node.is_conversation() || node.is_blank() {
                return Err(CanvasError::NothingToAsk(node_id.to_string()));
            }

            let model = node
                .model
                .clone()
                .or_else(|| previous.as_ref().map(|p| p.model.clone()))
                .unwrap_or_default();

            let messages = match previous {
                Some(previous) => previous.messages,
                None => {
                    let inputs = store.inputs_of(node_id);
                    self.history.from_inputs(&inputs, &node.content)
                }
            };
            (messages, model)
        };

        tracing::info!(node_id, provider = %model.provider, "retrying");
        Ok(self.sessions.start(node_id, messages, model))
    }

    /// Cancel any bound session, then remove the node and its edges
    pub fn delete_node(&self, node_id: &str) -> Result<Node> {
        if !self.store.lock().contains(node_id) {
            return Err(CanvasError::UnknownNode(node_id.to_string()));
        }

        self.sessions.discard(node_id);
        let node = self.store.lock().remove_node(node_id)?;

        tracing::info!(node_id, "node deleted");
        Ok(node)
    }

    /// Read a batch of files, lay them out in a row and start an analysis
    /// conversation fed by all of them.
    ///
    /// Nothing is added until every read has settled. Files that fail to
    /// read are dropped from the batch and reported in the outcome.
    pub async fn ingest_files(&self, uploads: &[FileUpload], model: ModelSelection) -> Result<IngestOutcome> {
        let reads = join_all(uploads.iter().map(|upload| self.files.read(upload))).await;

        let mut infos: Vec<FileInfo> = Vec::with_capacity(reads.len());
        let mut failures = Vec::new();
        for read in reads {
            match read {
                Ok(info) => infos.push(info),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping file from batch");
                    failures.push(e);
                }
            }
        }

        if infos.is_empty() {
            return Ok(IngestOutcome {
                file_nodes: Vec::new(),
                session: None,
                failures,
            });
        }

        let names: Vec<&str> = infos.iter().map(|info| info.name.as_str()).collect();
        let label = format!("Analyze files: {}", names.join(", "));
        let messages = self
            .history
            .file_analysis(&infos.iter().collect::<Vec<_>>(), &self.config.file_analysis_prompt);

        let (file_nodes, node_id) = {
            let mut store = self.store.lock();
            let placed = self.layout.place_many(&store.positions(), infos.len());

            let mut file_nodes = Vec::with_capacity(infos.len());
            for (info, position) in infos.iter().zip(&placed) {
                let node = Node::file(info.clone(), *position);
                file_nodes.push(node.id.clone());
                store.add_node(node)?;
            }

            let position = self.layout.place_below_cluster(&store.positions(), &placed);
            let node = Node::conversation(label, self.config.file_analysis_prompt.as_str(), position)
                .with_model(model.clone());
            let node_id = node.id.clone();
            store.add_node(node)?;

            for file_id in &file_nodes {
                store.add_edge(file_id, &node_id)?;
            }
            store.select(Some(node_id.as_str()))?;
            (file_nodes, node_id)
        };

        tracing::info!(
            node_id = %node_id,
            files = file_nodes.len(),
            dropped = failures.len(),
            "files ingested"
        );

        Ok(IngestOutcome {
            file_nodes,
            session: Some(self.sessions.start(&node_id, messages, model)),
            failures,
        })
    }

    /// Change the model used by the node's next session
    pub fn update_node_model(&self, node_id: &str, model: ModelSelection) -> Result<()> {
        self.store.lock().update_model(node_id, model)
    }

    /// User-drawn edge
    pub fn connect(&self, source: &str, target: &str) -> Result<Edge> {
        let edge = self.store.lock().add_edge(source, target)?;
        tracing::debug!(source, target, "nodes connected");
        Ok(edge)
    }

    pub fn select(&self, node_id: Option<&str>) -> Result<()> {
        self.store.lock().select(node_id)
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.store.lock().selected().cloned()
    }

    pub fn node(&self, node_id: &str) -> Option<Node> {
        self.store.lock().node(node_id).cloned()
    }

    /// Context nodes of `node_id`, in edge order
    pub fn inputs_of(&self, node_id: &str) -> Vec<Node> {
        self.store.lock().inputs_of(node_id).into_iter().cloned().collect()
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        let store = self.store.lock();
        CanvasSnapshot {
            nodes: store.nodes().cloned().collect(),
            edges: store.edges().to_vec(),
            selected: store.selected().cloned(),
        }
    }

    pub fn session_state(&self, node_id: &str) -> Option<SessionState> {
        self.sessions.state(node_id)
    }

    pub fn subscribe(&self, node_id: impl Into<NodeId>) -> Subscription {
        self.hub.subscribe(node_id)
    }

    pub fn subscribe_all(&self) -> Subscription {
        self.hub.subscribe_all()
    }

    /// Cancel every live session. The graph stays readable.
    pub fn dispose(&self) -> usize {
        let cancelled = self.sessions.cancel_all();
        tracing::info!(cancelled, "canvas disposed");
        cancelled
    }
}

fn provider_name(model: &ModelSelection) -> &'static str {
    model.provider.descriptor().name
}

fn follow_up_label(anchor: Option<&str>, model: &ModelSelection) -> String {
    match anchor.map(str::trim).filter(|a| !a.is_empty()) {
        Some(anchor) => {
            let excerpt: String = anchor.chars().take(ANCHOR_LABEL_CHARS).collect();
            format!("Follow-up: {}... ({})", excerpt, provider_name(model))
        }
        None => format!("Continue conversation ({})", provider_name(model)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchat_llm::ProviderId;

    #[test]
    fn test_follow_up_labels() {
        let model = ModelSelection::default_for(ProviderId::DeepSeek);

        assert_eq!(
            follow_up_label(Some("the borrow checker rejects this"), &model),
            "Follow-up: the borrow checker r... (DeepSeek)"
        );
        assert_eq!(follow_up_label(Some("short"), &model), "Follow-up: short... (DeepSeek)");
        assert_eq!(follow_up_label(None, &model), "Continue conversation (DeepSeek)");
        assert_eq!(follow_up_label(Some("  "), &model), "Continue conversation (DeepSeek)");
    }
}
