use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a conversation (a single top-level message, possibly
/// fanned out across a team).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Running,
    Complete,
    AbortedBudget,
}

/// One edge in the mention graph: `from_agent` sent a message that mentioned
/// `to_agent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionEdge {
    pub from_agent: String,
    pub to_agent: String,
    pub at: DateTime<Utc>,
}

/// A single agent's (or team member's) contribution to the final assembled
/// reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub agent_id: String,
    pub body: String,
    pub completed_at: DateTime<Utc>,
}

/// Full state of one conversation as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub team_id: Option<String>,
    pub status: ConversationStatus,

    /// Number of branches (agent invocations) that have been dispatched but
    /// have not yet completed. Reaching zero triggers final aggregation.
    pub pending_branches: u32,

    pub total_messages: u32,
    pub message_budget: u32,

    pub mentions: Vec<MentionEdge>,

    /// Completed responses, in completion order (not dispatch order) —
    /// aggregation joins them with `\n\n------\n\n` once `pending_branches`
    /// reaches zero.
    pub responses: Vec<ConversationResponse>,

    /// The raw text of the top-level message that started this conversation,
    /// echoed back in the outgoing record's `originalMessage` field.
    pub original_message: String,

    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(team_id: Option<String>, message_budget: u32, original_message: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            team_id,
            status: ConversationStatus::Running,
            pending_branches: 1,
            total_messages: 0,
            message_budget,
            mentions: Vec::new(),
            responses: Vec::new(),
            original_message,
            created_at: Utc::now(),
        }
    }

    /// True when the conversation must stop making progress: either every
    /// dispatched branch has completed, or the message budget is exhausted.
    pub fn is_quiescent(&self) -> bool {
        self.pending_branches == 0 || self.status != ConversationStatus::Running
    }

    /// Record dispatch of `count` new branches (e.g. a fan-out to team
    /// members). Invariant: `pending_branches` only reaches zero when every
    /// dispatched branch has reported completion via `complete_branch`.
    pub fn dispatch_branches(&mut self, count: u32) {
        self.pending_branches += count;
    }

    /// Record completion of one branch, folding its response in. Returns
    /// `true` if this was the branch that brought the conversation to
    /// quiescence.
    pub fn complete_branch(&mut self, response: ConversationResponse) -> bool {
        self.responses.push(response);
        self.pending_branches = self.pending_branches.saturating_sub(1);
        self.total_messages += 1;

        if self.pending_branches == 0 {
            self.status = ConversationStatus::Complete;
        } else if self.total_messages >= self.message_budget {
            self.status = ConversationStatus::AbortedBudget;
        }

        self.is_quiescent()
    }

    /// Join every completed response into the final aggregate body, in the
    /// order responses completed (not the order branches were dispatched).
    /// A lone response is returned bare, with no `@agentId:` prefix — the
    /// prefix only disambiguates when more than one agent contributed.
    pub fn aggregate(&self) -> String {
        if let [only] = self.responses.as_slice() {
            return only.body.clone();
        }
        self.responses
            .iter()
            .map(|r| format!("@{}: {}", r.agent_id, r.body))
            .collect::<Vec<_>>()
            .join("\n\n------\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(agent: &str, body: &str) -> ConversationResponse {
        ConversationResponse {
            agent_id: agent.into(),
            body: body.into(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn single_branch_conversation_completes_on_first_response() {
        let mut conv = Conversation::new(None, 50, "hi".into());
        assert!(!conv.is_quiescent());
        let done = conv.complete_branch(resp("default", "hi"));
        assert!(done);
        assert_eq!(conv.status, ConversationStatus::Complete);
        // a single response is returned bare, with no "@agentId:" prefix
        assert_eq!(conv.aggregate(), "hi");
    }

    #[test]
    fn fan_out_conversation_waits_for_every_branch() {
        let mut conv = Conversation::new(Some("alpha".into()), 50, "let's ship this".into());
        conv.dispatch_branches(2); // leader + 2 members = pending 3 total
        assert_eq!(conv.pending_branches, 3);
        assert!(!conv.complete_branch(resp("leader", "a")));
        assert!(!conv.complete_branch(resp("member-1", "b")));
        assert!(conv.complete_branch(resp("member-2", "c")));
        assert_eq!(conv.status, ConversationStatus::Complete);
        assert_eq!(conv.aggregate(), "@leader: a\n\n------\n\n@member-1: b\n\n------\n\n@member-2: c");
    }

    #[test]
    fn budget_exactly_at_cap_with_no_pending_branches_completes_normally() {
        let mut conv = Conversation::new(None, 1, "final".into());
        let done = conv.complete_branch(resp("default", "final"));
        assert!(done);
        // pending_branches reached zero in the same step the budget was hit;
        // natural completion takes precedence over a forced abort.
        assert_eq!(conv.status, ConversationStatus::Complete);
    }

    #[test]
    fn budget_hit_before_branches_drain_aborts() {
        let mut conv = Conversation::new(None, 2, "go".into());
        conv.dispatch_branches(5);
        conv.complete_branch(resp("a", "1"));
        let done = conv.complete_branch(resp("b", "2"));
        assert!(done);
        assert_eq!(conv.status, ConversationStatus::AbortedBudget);
        assert!(conv.pending_branches > 0);
    }
}
