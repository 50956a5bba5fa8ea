use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A message record as written into `incoming/` by a channel adapter, or into
/// `processing/` once claimed.
///
/// Field names match the wire contract in the queue-file JSON shapes: a
/// channel adapter writing `{"channel": "telegram", "sender": "...", ...}`
/// must parse here unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub channel: String,
    pub sender: String,

    /// Optional per the wire contract — a channel that cannot supply a
    /// stable sender id still gets routed, just not allowlist-checked.
    #[serde(default)]
    pub sender_id: Option<String>,
    pub message_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,

    /// Set when a channel adapter (or an internal replier) already knows
    /// which agent should handle this message. When present, the router is
    /// bypassed entirely.
    #[serde(default)]
    pub agent: Option<String>,

    /// Present for messages that are a branch of an already-running
    /// conversation (e.g. a teammate reply). Combined with `agent`, this is
    /// the "internal message" bypass path described in the design notes.
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// The agent that produced this message, when it originated as a
    /// teammate-to-teammate hand-off rather than from an external channel.
    #[serde(default)]
    pub from_agent: Option<String>,

    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Free-form metadata a channel adapter may attach (thread id, reply-to,
    /// etc.) that the core does not interpret but must preserve.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl IncomingMessage {
    /// True when this message should bypass routing entirely: it already
    /// names its destination agent and belongs to a live conversation.
    pub fn is_internal(&self) -> bool {
        self.agent.is_some() && self.conversation_id.is_some()
    }
}

/// A response record committed into `outgoing/` for delivery back to a
/// channel adapter. Field names and shape match the §6 outgoing wire
/// contract exactly, so a channel adapter can parse it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingResponse {
    pub channel: String,
    pub sender: String,
    pub message: String,

    /// The original message text this is a reply to, echoed back so a
    /// channel adapter can thread the reply without keeping its own state.
    pub original_message: String,

    pub timestamp: DateTime<Utc>,
    pub message_id: String,

    /// The agent (or, for a team, the leader) whose reply this is.
    #[serde(default)]
    pub agent: Option<String>,

    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl OutgoingResponse {
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.channel, self.message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn incoming_message_parses_minimal_payload() {
        let raw = json!({
            "channel": "telegram",
            "sender": "alice",
            "senderId": "123",
            "messageId": "m1",
            "message": "hello",
            "timestamp": "2026-01-01T00:00:00Z",
        });
        let parsed: IncomingMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.channel, "telegram");
        assert!(parsed.agent.is_none());
        assert!(parsed.files.is_empty());
        assert!(!parsed.is_internal());
    }

    #[test]
    fn incoming_message_internal_bypass_requires_both_fields() {
        let mut msg = IncomingMessage {
            channel: "internal".into(),
            sender: "team-leader".into(),
            sender_id: Some("team-leader".into()),
            message_id: "m2".into(),
            message: "branch reply".into(),
            timestamp: Utc::now(),
            agent: Some("researcher".into()),
            conversation_id: None,
            from_agent: None,
            files: vec![],
            metadata: Default::default(),
        };
        assert!(!msg.is_internal());
        msg.conversation_id = Some("conv-1".into());
        assert!(msg.is_internal());
    }

    #[test]
    fn outgoing_response_roundtrips() {
        let resp = OutgoingResponse {
            channel: "discord".into(),
            sender: "bob".into(),
            message: "done".into(),
            original_message: "can you finish this up?".into(),
            timestamp: Utc::now(),
            message_id: "m3".into(),
            agent: Some("default".into()),
            files: vec![],
        };
        let encoded = serde_json::to_string(&resp).unwrap();
        let decoded: OutgoingResponse = serde_json::from_str(&encoded).unwrap();
        assert_eq!(resp, decoded);
        assert_eq!(resp.file_name(), "discord_m3.json");
    }

    #[test]
    fn outgoing_response_matches_the_wire_contract_field_names() {
        let resp = OutgoingResponse {
            channel: "discord".into(),
            sender: "bob".into(),
            message: "done".into(),
            original_message: "please finish this".into(),
            timestamp: Utc::now(),
            message_id: "m3".into(),
            agent: Some("default".into()),
            files: vec![],
        };
        let value = serde_json::to_value(&resp).unwrap();
        for key in ["channel", "sender", "message", "originalMessage", "timestamp", "messageId", "agent"] {
            assert!(value.get(key).is_some(), "missing wire field {key}");
        }
        assert!(value.get("recipient").is_none());
        assert!(value.get("fromAgent").is_none());
    }

    #[test]
    fn incoming_message_backward_compat_missing_optional_fields() {
        // A record written before `metadata`/`files`/`senderId` existed should
        // still parse.
        let raw = json!({
            "channel": "http",
            "sender": "web",
            "messageId": "m4",
            "message": "ping",
            "timestamp": "2026-01-01T00:00:00Z",
        });
        let parsed: IncomingMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.metadata.len(), 0);
        assert!(parsed.sender_id.is_none());
    }
}
