use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::types::{NodeId, SessionUpdate};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Topic {
    Node(NodeId),
    All,
}

impl Topic {
    fn matches(&self, node_id: &str) -> bool {
        match self {
            Topic::Node(id) => id == node_id,
            Topic::All => true,
        }
    }
}

struct Subscriber {
    id: u64,
    topic: Topic,
    tx: mpsc::UnboundedSender<SessionUpdate>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Fan-out of session updates to any number of views, keyed by node id
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    inner: Arc<Mutex<HubInner>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates for one node
    pub fn subscribe(&self, node_id: impl Into<NodeId>) -> Subscription {
        self.register(Topic::Node(node_id.into()))
    }

    /// Updates for every node
    pub fn subscribe_all(&self) -> Subscription {
        self.register(Topic::All)
    }

    fn register(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber { id, topic, tx });

        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
            rx,
        }
    }

    /// Deliver to every matching subscriber, pruning the ones whose receiver is gone
    pub fn publish(&self, update: &SessionUpdate) {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|sub| {
            if !sub.topic.matches(&update.node_id) {
                return !sub.tx.is_closed();
            }
            sub.tx.send(update.clone()).is_ok()
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    fn remove(inner: &Mutex<HubInner>, id: u64) {
        inner.lock().subscribers.retain(|sub| sub.id != id);
    }
}

/// Receiving end of a subscription; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    hub: Weak<Mutex<HubInner>>,
    rx: mpsc::UnboundedReceiver<SessionUpdate>,
}

impl Subscription {
    /// Next update, or `None` once unsubscribed
    pub async fn recv(&mut self) -> Option<SessionUpdate> {
        self.rx.recv().await
    }

    /// Next already-delivered update, without waiting
    pub fn try_recv(&mut self) -> Option<SessionUpdate> {
        self.rx.try_recv().ok()
    }

    /// Everything delivered so far
    pub fn drain(&mut self) -> Vec<SessionUpdate> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            SubscriptionHub::remove(&inner, self.id);
        }
    }
}
