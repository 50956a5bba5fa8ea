use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static configuration for one agent, as loaded from the settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    /// True if `candidate` (already lowercased) matches this agent's id or
    /// any of its aliases/display name, case-insensitively.
    pub fn matches_mention(&self, candidate_lower: &str) -> bool {
        self.id.to_lowercase() == candidate_lower
            || self.display_name.to_lowercase() == candidate_lower
            || self
                .aliases
                .iter()
                .any(|a| a.to_lowercase() == candidate_lower)
    }
}

/// Static configuration for a team: a leader agent plus a roster of member
/// agent ids that may be fanned out to via `[@member: ...]` tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamConfig {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub leader: String,
    pub members: Vec<String>,
    #[serde(default = "default_message_budget")]
    pub message_budget: u32,
}

fn default_message_budget() -> u32 {
    50
}

impl TeamConfig {
    pub fn matches_mention(&self, candidate_lower: &str) -> bool {
        self.id.to_lowercase() == candidate_lower
            || self.display_name.to_lowercase() == candidate_lower
            || self
                .aliases
                .iter()
                .any(|a| a.to_lowercase() == candidate_lower)
    }
}

/// The outcome of routing one incoming message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoutingDecision {
    /// Route straight to a single agent (explicit `@mention`, or fallback to
    /// the configured default agent). `body` has any leading `@mention`
    /// stripped — it is what actually gets sent to the model.
    Agent { agent_id: String, body: String },
    /// Route to a team; the team leader receives the message first. `body`
    /// has the leading `@team` mention stripped.
    Team { team_id: String, body: String },
    /// The message named more than one top-level target and must be
    /// rejected with a canned reply instead of routed.
    Rejected { reason: RejectionReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    MultipleTopLevelMentions,
    UnknownMention { mentioned: String },
    SenderNotAllowed,
}

/// State a plugin hook may persist across invocations for one agent/session.
/// Kept as a tolerant JSON bag since plugins are not compiled into this repo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginState {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl PluginState {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.fields.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_agent() -> AgentConfig {
        AgentConfig {
            id: "researcher".into(),
            display_name: "Researcher".into(),
            aliases: vec!["res".into()],
            command: "researcher-cli".into(),
            args: vec![],
            working_dir: None,
            env: HashMap::new(),
            enabled: true,
        }
    }

    #[test]
    fn agent_matches_mention_case_insensitively_on_id_name_and_alias() {
        let agent = sample_agent();
        assert!(agent.matches_mention("researcher"));
        assert!(agent.matches_mention("RESEARCHER"));
        assert!(agent.matches_mention("res"));
        assert!(!agent.matches_mention("stranger"));
    }

    #[test]
    fn team_default_message_budget_is_fifty() {
        let team = TeamConfig {
            id: "alpha".into(),
            display_name: "Alpha Team".into(),
            aliases: vec![],
            leader: "researcher".into(),
            members: vec!["researcher".into(), "writer".into()],
            message_budget: default_message_budget(),
        };
        assert_eq!(team.message_budget, 50);
    }

    #[test]
    fn plugin_state_roundtrips_arbitrary_fields() {
        let mut state = PluginState::default();
        state.set("retries", serde_json::json!(3));
        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: PluginState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.get("retries"), Some(&serde_json::json!(3)));
    }
}
