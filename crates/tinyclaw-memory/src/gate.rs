use regex::Regex;
use tinyclaw_schema::MemoryGateMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Fetch,
    Skip,
    /// Neither a force nor a skip rule matched; only reachable from rule
    /// gates, and only escalated further when the mode is `rule_then_llm`.
    Ambiguous,
}

/// A pair of regex lists deciding whether a message's content clearly
/// warrants (or clearly doesn't warrant) a memory lookup.
pub struct RuleGate {
    force: Vec<Regex>,
    skip: Vec<Regex>,
}

impl RuleGate {
    pub fn new(force_patterns: Vec<String>, skip_patterns: Vec<String>) -> Self {
        let compile = |patterns: Vec<String>| {
            patterns
                .into_iter()
                .filter_map(|p| match Regex::new(&p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %p, error = %e, "invalid memory gate pattern, ignoring");
                        None
                    }
                })
                .collect()
        };
        Self {
            force: compile(force_patterns),
            skip: compile(skip_patterns),
        }
    }

    pub fn evaluate(&self, message: &str) -> GateDecision {
        if self.skip.iter().any(|re| re.is_match(message)) {
            return GateDecision::Skip;
        }
        if self.force.iter().any(|re| re.is_match(message)) {
            return GateDecision::Fetch;
        }
        GateDecision::Ambiguous
    }
}

/// Alias kept for call sites that want to name the trait-shaped concept even
/// though, today, only the rule-based implementation exists in-crate.
pub type MemoryGate = RuleGate;

pub fn decide(mode: MemoryGateMode, rule_gate: &RuleGate, message: &str) -> GateDecision {
    match mode {
        MemoryGateMode::Never => GateDecision::Skip,
        MemoryGateMode::Always => GateDecision::Fetch,
        MemoryGateMode::Rule => match rule_gate.evaluate(message) {
            GateDecision::Ambiguous => GateDecision::Skip,
            other => other,
        },
        MemoryGateMode::RuleThenLlm => rule_gate.evaluate(message),
    }
}
