use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// A UUID-shaped token, used as a fallback way to spot a session id in a
/// line of subprocess output that doesn't follow the expected JSON shape.
pub const SESSION_ID_PATTERN: &str =
    r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

fn session_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SESSION_ID_PATTERN).expect("valid uuid regex"))
}

/// One line of the agent subprocess's JSON-lines stdout, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    AssistantText(String),
    ToolActivity(String),
    SessionId(String),
    /// A line that didn't parse as any recognized shape; treated as raw
    /// assistant text so output is never silently dropped.
    Unrecognized(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawLine {
    Assistant { text: String },
    ToolUse { name: String },
    ToolResult { name: String, #[serde(default)] summary: Option<String> },
    Session { id: String },
}

/// Classify one line of subprocess stdout. Falls back to scanning for a
/// bare UUID (session-id extraction) and finally to treating the whole line
/// as assistant text if nothing else matches — matching the tolerant,
/// never-panic parsing idiom used throughout this codebase for anything
/// that crosses a process boundary.
pub fn classify_line(line: &str) -> AgentEvent {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return AgentEvent::Unrecognized(String::new());
    }

    if let Ok(raw) = serde_json::from_str::<RawLine>(trimmed) {
        return match raw {
            RawLine::Assistant { text } => AgentEvent::AssistantText(text),
            RawLine::ToolUse { name } => AgentEvent::ToolActivity(format!("tool_use: {name}")),
            RawLine::ToolResult { name, summary } => AgentEvent::ToolActivity(format!(
                "tool_result: {name}{}",
                summary.map(|s| format!(" ({s})")).unwrap_or_default()
            )),
            RawLine::Session { id } => AgentEvent::SessionId(id),
        };
    }

    if let Some(m) = session_id_regex().find(trimmed) {
        return AgentEvent::SessionId(m.as_str().to_string());
    }

    AgentEvent::Unrecognized(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_assistant_text_line() {
        let event = classify_line(r#"{"type":"assistant","text":"hi there"}"#);
        assert_eq!(event, AgentEvent::AssistantText("hi there".into()));
    }

    #[test]
    fn classifies_tool_use_line() {
        let event = classify_line(r#"{"type":"tool_use","name":"search"}"#);
        assert_eq!(event, AgentEvent::ToolActivity("tool_use: search".into()));
    }

    #[test]
    fn classifies_session_line() {
        let event = classify_line(r#"{"type":"session","id":"abc-123"}"#);
        assert_eq!(event, AgentEvent::SessionId("abc-123".into()));
    }

    #[test]
    fn extracts_uuid_session_id_from_unstructured_line() {
        let event = classify_line("session started: 123e4567-e89b-12d3-a456-426614174000");
        assert_eq!(
            event,
            AgentEvent::SessionId("123e4567-e89b-12d3-a456-426614174000".into())
        );
    }

    #[test]
    fn falls_back_to_unrecognized_for_plain_text() {
        let event = classify_line("not json at all");
        assert_eq!(event, AgentEvent::Unrecognized("not json at all".into()));
    }

    #[test]
    fn empty_line_is_unrecognized_and_empty() {
        let event = classify_line("   ");
        assert_eq!(event, AgentEvent::Unrecognized(String::new()));
    }
}
