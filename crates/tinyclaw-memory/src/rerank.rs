use crate::store::MemorySnippet;

const CODE_FENCE_BONUS: f64 = 0.2;
const AFFIRMATIVE_BONUS: f64 = 0.1;
const LOW_CONFIDENCE_PENALTY: f64 = 0.3;

const AFFIRMATIVE_MARKERS: &[&str] = &["confirmed", "always", "must", "exactly"];
const LOW_CONFIDENCE_MARKERS: &[&str] = &["i'm not sure", "i don't know", "maybe", "possibly", "not certain"];

/// Rerank snippets by a small set of textual heuristics on top of whatever
/// base relevance score the store already assigned, then sort descending.
/// Kept deliberately simple and dependency-free (no embeddings) since the
/// real semantic ranking lives in the external memory store this crate only
/// talks to through `MemoryStore`.
pub fn rerank(mut snippets: Vec<MemorySnippet>) -> Vec<MemorySnippet> {
    for snippet in &mut snippets {
        let lower = snippet.text.to_lowercase();
        if snippet.text.contains("```") {
            snippet.base_score += CODE_FENCE_BONUS;
        }
        if AFFIRMATIVE_MARKERS.iter().any(|m| lower.contains(m)) {
            snippet.base_score += AFFIRMATIVE_BONUS;
        }
        if LOW_CONFIDENCE_MARKERS.iter().any(|m| lower.contains(m)) {
            snippet.base_score -= LOW_CONFIDENCE_PENALTY;
        }
    }
    snippets.sort_by(|a, b| b.base_score.partial_cmp(&a.base_score).unwrap());
    snippets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(text: &str, score: f64) -> MemorySnippet {
        MemorySnippet {
            text: text.to_string(),
            base_score: score,
        }
    }

    #[test]
    fn code_fence_snippets_are_ranked_above_equal_base_score_prose() {
        let ranked = rerank(vec![
            snippet("plain text", 0.5),
            snippet("```rust\nfn x() {}\n```", 0.5),
        ]);
        assert!(ranked[0].text.contains("```"));
    }

    #[test]
    fn low_confidence_marker_demotes_a_snippet() {
        let ranked = rerank(vec![
            snippet("I'm not sure but maybe this", 0.9),
            snippet("the deploy key is stored in vault", 0.5),
        ]);
        assert_eq!(ranked[0].text, "the deploy key is stored in vault");
    }

    #[test]
    fn affirmative_markers_boost_ranking() {
        let ranked = rerank(vec![
            snippet("some unrelated note", 0.5),
            snippet("the policy is always applied exactly this way", 0.5),
        ]);
        assert!(ranked[0].text.contains("always applied"));
    }
}
