//! `@mention`-based message routing.
//!
//! Adapted from `clawhive-core/src/router.rs`'s candidate-resolution shape
//! (try each candidate, log why it was skipped, fall back to a default) —
//! that file routes LLM provider failover, this one routes `@agent`/`@team`
//! prefixes, but the "resolve, log, fall back" control flow is the same
//! idiom.

use regex::Regex;
use std::sync::OnceLock;
use tinyclaw_schema::{AgentConfig, RejectionReason, RoutingDecision, TeamConfig};
use tracing::debug;

fn leading_mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*@([A-Za-z0-9_\-]+)\b").expect("valid leading mention regex"))
}

/// A read-only snapshot of the routing table, rebuilt once per dispatch tick
/// from the loaded `Settings` so routing never needs to lock anything.
pub struct RoutingConfig {
    pub agents: Vec<AgentConfig>,
    pub teams: Vec<TeamConfig>,
    pub default_agent: String,
}

/// Extract every *leading* `@mention` token (consecutive mentions at the
/// very start of the message, before any other content), along with
/// whatever text follows the last one. A message like `"@alpha @beta do
/// this"` has two leading mentions and must be rejected; `"hello @alpha"`
/// has zero, since the mention isn't at the top level.
fn strip_leading_mentions(message: &str) -> (Vec<String>, &str) {
    let mut rest = message;
    let mut mentions = Vec::new();
    loop {
        let Some(caps) = leading_mention_regex().captures(rest) else {
            break;
        };
        mentions.push(caps[1].to_string());
        rest = &rest[caps[0].len()..];
    }
    (mentions, rest.trim_start())
}

/// Route one message. `message_text` should be the raw body the sender
/// wrote (post `transformIncoming` plugin hooks, pre conversation creation).
/// The returned decision carries the message body with any leading mention
/// stripped, so a routed message and an already-routed internal message
/// reach the model in the same shape.
pub fn route(config: &RoutingConfig, message_text: &str) -> RoutingDecision {
    let (mentions, rest) = strip_leading_mentions(message_text);

    if mentions.len() > 1 {
        debug!(count = mentions.len(), "rejecting message with multiple top-level mentions");
        return RoutingDecision::Rejected {
            reason: RejectionReason::MultipleTopLevelMentions,
        };
    }

    let Some(mention) = mentions.into_iter().next() else {
        debug!(agent = %config.default_agent, "no mention found, routing to default agent");
        return RoutingDecision::Agent {
            agent_id: config.default_agent.clone(),
            body: message_text.to_string(),
        };
    };

    let lower = mention.to_lowercase();
    let body = rest.to_string();

    if let Some(agent) = config.agents.iter().find(|a| a.matches_mention(&lower)) {
        debug!(agent = %agent.id, "routed to agent by mention");
        return RoutingDecision::Agent {
            agent_id: agent.id.clone(),
            body,
        };
    }

    if let Some(team) = config.teams.iter().find(|t| t.matches_mention(&lower)) {
        debug!(team = %team.id, "routed to team by mention");
        return RoutingDecision::Team {
            team_id: team.id.clone(),
            body,
        };
    }

    debug!(mention = %mention, "mention did not resolve to any agent or team");
    RoutingDecision::Rejected {
        reason: RejectionReason::UnknownMention { mentioned: mention },
    }
}
