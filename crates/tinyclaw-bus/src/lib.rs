//! In-process event bus used to fan internal lifecycle events out to the
//! admin/dev HTTP surface (`tinyclaw-server`'s SSE stream) and to anything
//! else within the daemon that wants to observe dispatch activity without
//! being wired directly into the dispatcher.
//!
//! Modeled on the publish/subscribe shape inferred from `clawhive-server`'s
//! SSE route (`state.bus.subscribe(Topic::X).await` followed by a
//! `try_recv` poll loop): one `tokio::sync::broadcast` channel per topic,
//! with lagging subscribers simply missing events rather than blocking
//! publishers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Topics a subscriber can listen to independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    MessageReceived,
    MessageRouted,
    AgentInvoked,
    AgentCompleted,
    ConversationCompleted,
    ResponseCommitted,
    PluginHookFailed,
    MemoryPrefetchSkipped,
}

pub const ALL_TOPICS: &[Topic] = &[
    Topic::MessageReceived,
    Topic::MessageRouted,
    Topic::AgentInvoked,
    Topic::AgentCompleted,
    Topic::ConversationCompleted,
    Topic::ResponseCommitted,
    Topic::PluginHookFailed,
    Topic::MemoryPrefetchSkipped,
];

/// One event published onto the bus. Kept as a flat, serializable struct
/// (rather than a payload-per-topic enum) so the SSE route can serialize it
/// without matching on topic first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub topic: Topic,
    pub conversation_id: Option<String>,
    pub agent_id: Option<String>,
    pub detail: String,
    pub at: chrono_compat::Timestamp,
}

/// Small local shim so this crate doesn't need to pull in the `chrono`
/// dependency just for one timestamp field; callers pass whatever
/// millisecond-since-epoch value their clock produced.
pub mod chrono_compat {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Timestamp(pub i64);
}

const CHANNEL_CAPACITY: usize = 256;

/// The bus itself: one broadcast sender per topic, created lazily on first
/// publish/subscribe so a topic nobody cares about never allocates a
/// channel.
#[derive(Clone)]
pub struct EventBus {
    senders: Arc<RwLock<HashMap<Topic, broadcast::Sender<BusEvent>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn sender_for(&self, topic: Topic) -> broadcast::Sender<BusEvent> {
        if let Some(tx) = self.senders.read().await.get(&topic) {
            return tx.clone();
        }
        let mut guard = self.senders.write().await;
        guard
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish an event. Best-effort: if nobody is subscribed, the send
    /// simply has zero receivers and is dropped, matching broadcast's
    /// semantics — the dispatcher must never block on an unread bus.
    pub async fn publish(&self, event: BusEvent) {
        let tx = self.sender_for(event.topic).await;
        let _ = tx.send(event);
    }

    /// Subscribe to one topic, receiving every event published to it from
    /// this point forward.
    pub async fn subscribe(&self, topic: Topic) -> broadcast::Receiver<BusEvent> {
        self.sender_for(topic).await.subscribe()
    }
}
