//! Memory prefetch: decide whether a retrieval is worth running before an
//! agent invocation, run it inside a time budget carved out of the overall
//! `beforeModel` hook budget, rerank what comes back, and frame it for
//! injection into the prompt.
//!
//! The gate/rerank split is grounded on `clawhive-core/src/hooks.rs`'s
//! `before_prompt_build` context-merging idiom (several independent
//! contributions folded into one prepended string); the retrieval store
//! itself is modeled on `clawhive-memory`'s use of `rusqlite` for a small
//! embedded index, since the real production memory store is an external
//! collaborator this crate only calls through a trait.

pub mod gate;
pub mod rerank;
pub mod store;

pub use gate::{GateDecision, MemoryGate, RuleGate};
pub use rerank::rerank;
pub use store::{MemoryError, MemorySnippet, MemoryStore, SqliteMemoryStore};

use std::time::Duration;
use tinyclaw_schema::MemoryConfig;
use tracing::{debug, warn};

pub const CONTEXT_HEADER: &str = "[OpenViking Retrieved Context]";
pub const CONTEXT_FOOTER: &str = "[End OpenViking Context]";

/// Something that can decide, given free text, whether memory retrieval is
/// worth the cost — the LLM-backed escalation path used by
/// `rule_then_llm` gate mode. The actual model call lives in
/// `tinyclaw-invoker`; this crate only depends on the trait to avoid a
/// circular crate dependency.
#[async_trait::async_trait]
pub trait LlmGate: Send + Sync {
    async fn should_fetch(&self, query: &str) -> bool;
}

/// Run the full prefetch pipeline: gate, retrieve (budget-bounded), rerank,
/// frame. Returns `None` whenever the gate says skip, the budget is already
/// exhausted, or retrieval times out or errors — prefetch failure is never
/// fatal to the agent invocation it was trying to help.
pub async fn prefetch(
    config: &MemoryConfig,
    rule_gate: &RuleGate,
    llm_gate: Option<&dyn LlmGate>,
    store: &dyn MemoryStore,
    channel: &str,
    sender_id: &str,
    agent_id: &str,
    query: &str,
) -> Option<String> {
    let decision = gate::decide(config.gate_mode, rule_gate, query);
    let should_fetch = match decision {
        GateDecision::Fetch => true,
        GateDecision::Skip => false,
        GateDecision::Ambiguous => {
            if let Some(llm) = llm_gate {
                llm.should_fetch(query).await
            } else {
                false
            }
        }
    };

    if !should_fetch {
        debug!(channel, sender_id, agent_id, "memory gate declined to fetch");
        return None;
    }

    let budget_ms = config.hook_budget_ms.saturating_sub(config.safety_margin_ms);
    if budget_ms == 0 {
        warn!("memory hook budget exhausted by safety margin, skipping prefetch");
        return None;
    }

    let retrieval = tokio::time::timeout(
        Duration::from_millis(budget_ms),
        store.search(channel, sender_id, agent_id, query),
    )
    .await;

    let snippets = match retrieval {
        Ok(Ok(snippets)) => snippets,
        Ok(Err(e)) => {
            warn!(error = %e, "memory retrieval failed, skipping prefetch");
            return None;
        }
        Err(_) => {
            warn!(budget_ms, "memory retrieval exceeded its time budget, skipping prefetch");
            return None;
        }
    };

    if snippets.is_empty() {
        return None;
    }

    let ranked = rerank(snippets);
    let body = frame(&ranked, config.max_snippet_chars);
    Some(body)
}

/// Join ranked snippets into the bounded, framed context block.
fn frame(snippets: &[MemorySnippet], max_chars: usize) -> String {
    let mut body = String::new();
    for snippet in snippets {
        if body.len() + snippet.text.len() > max_chars {
            break;
        }
        if !body.is_empty() {
            body.push_str("\n\n");
        }
        body.push_str(&snippet.text);
    }
    if body.len() > max_chars {
        body.truncate(max_chars);
    }
    format!("{CONTEXT_HEADER}\n{body}\n{CONTEXT_FOOTER}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tinyclaw_schema::MemoryGateMode;

    struct StubStore(Vec<MemorySnippet>);

    #[async_trait]
    impl MemoryStore for StubStore {
        async fn search(
            &self,
            _channel: &str,
            _sender_id: &str,
            _agent_id: &str,
            _query: &str,
        ) -> Result<Vec<MemorySnippet>, MemoryError> {
            Ok(self.0.clone())
        }
    }

    fn snippet(text: &str, score: f64) -> MemorySnippet {
        MemorySnippet {
            text: text.to_string(),
            base_score: score,
        }
    }

    #[tokio::test]
    async fn gate_never_always_skips_regardless_of_content() {
        let mut config = MemoryConfig::default();
        config.gate_mode = MemoryGateMode::Never;
        let rule_gate = RuleGate::new(vec![], vec![]);
        let store = StubStore(vec![snippet("irrelevant", 1.0)]);
        let result = prefetch(&config, &rule_gate, None, &store, "telegram", "1", "default", "anything").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn gate_always_fetches_and_frames_output() {
        let mut config = MemoryConfig::default();
        config.gate_mode = MemoryGateMode::Always;
        let rule_gate = RuleGate::new(vec![], vec![]);
        let store = StubStore(vec![snippet("remembered fact", 1.0)]);
        let result = prefetch(&config, &rule_gate, None, &store, "telegram", "1", "default", "anything")
            .await
            .unwrap();
        assert!(result.starts_with(CONTEXT_HEADER));
        assert!(result.ends_with(CONTEXT_FOOTER));
        assert!(result.contains("remembered fact"));
    }

    #[tokio::test]
    async fn output_is_capped_at_max_snippet_chars() {
        let mut config = MemoryConfig::default();
        config.gate_mode = MemoryGateMode::Always;
        config.max_snippet_chars = 20;
        let rule_gate = RuleGate::new(vec![], vec![]);
        let store = StubStore(vec![snippet(&"x".repeat(100), 1.0)]);
        let result = prefetch(&config, &rule_gate, None, &store, "telegram", "1", "default", "q")
            .await
            .unwrap();
        let body_only = result
            .trim_start_matches(CONTEXT_HEADER)
            .trim_end_matches(CONTEXT_FOOTER);
        assert!(body_only.len() <= 20 + 2); // +2 for the surrounding newlines
    }

    #[tokio::test]
    async fn zero_remaining_budget_skips_without_calling_the_store() {
        let mut config = MemoryConfig::default();
        config.gate_mode = MemoryGateMode::Always;
        config.hook_budget_ms = 500;
        config.safety_margin_ms = 500;
        let rule_gate = RuleGate::new(vec![], vec![]);
        let store = StubStore(vec![snippet("should not appear", 1.0)]);
        let result = prefetch(&config, &rule_gate, None, &store, "telegram", "1", "default", "q").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn empty_retrieval_yields_no_context() {
        let mut config = MemoryConfig::default();
        config.gate_mode = MemoryGateMode::Always;
        let rule_gate = RuleGate::new(vec![], vec![]);
        let store = StubStore(vec![]);
        let result = prefetch(&config, &rule_gate, None, &store, "telegram", "1", "default", "q").await;
        assert!(result.is_none());
    }
}
