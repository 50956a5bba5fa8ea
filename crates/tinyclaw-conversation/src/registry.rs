use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tinyclaw_schema::{Conversation, ConversationResponse, MentionEdge};
use tokio::sync::Mutex;
use tracing::debug;

/// Owns every conversation currently in flight. A `Mutex` (not an
/// `RwLock`) is used deliberately: every access here mutates state
/// (dispatching or completing a branch), unlike `peer_registry.rs`'s
/// mostly-read workload.
#[derive(Clone)]
pub struct ConversationRegistry {
    conversations: Arc<Mutex<HashMap<String, Conversation>>>,
}

impl Default for ConversationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start tracking a new conversation (a freshly routed top-level
    /// message), returning its generated id. `original_message` is the raw
    /// text of the message that started it, echoed back once the
    /// conversation completes.
    pub async fn start(&self, team_id: Option<String>, message_budget: u32, original_message: String) -> String {
        let conv = Conversation::new(team_id, message_budget, original_message);
        let id = conv.id.clone();
        debug!(conversation_id = %id, "started conversation");
        self.conversations.lock().await.insert(id.clone(), conv);
        id
    }

    /// Record that `from_agent` mentioned `to_agent`, and increase the
    /// conversation's pending branch count by one for that fan-out.
    pub async fn record_mention(&self, conversation_id: &str, from_agent: &str, to_agent: &str) {
        let mut guard = self.conversations.lock().await;
        if let Some(conv) = guard.get_mut(conversation_id) {
            conv.mentions.push(MentionEdge {
                from_agent: from_agent.to_string(),
                to_agent: to_agent.to_string(),
                at: Utc::now(),
            });
            conv.dispatch_branches(1);
        }
    }

    /// Record completion of one branch. Returns `Some((aggregate,
    /// original_message))` if this was the branch that brought the
    /// conversation to quiescence, in which case the conversation is also
    /// removed from the registry.
    pub async fn complete_branch(
        &self,
        conversation_id: &str,
        response: ConversationResponse,
    ) -> Option<(String, String)> {
        let mut guard = self.conversations.lock().await;
        let conv = guard.get_mut(conversation_id)?;
        let quiescent = conv.complete_branch(response);
        if quiescent {
            let aggregate = conv.aggregate();
            let original_message = conv.original_message.clone();
            debug!(conversation_id, status = ?conv.status, "conversation reached quiescence");
            guard.remove(conversation_id);
            Some((aggregate, original_message))
        } else {
            None
        }
    }

    pub async fn get(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations.lock().await.get(conversation_id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.conversations.lock().await.len()
    }
}
