//! Shared control-tag grammar.
//!
//! Two tag forms appear in raw agent output and must be parsed identically by
//! the conversation registry (which needs the mention targets) and the
//! response assembler (which needs to strip them before anything reaches a
//! channel): `[@agentId[,agentId...]: body]` and `[send_file: /absolute/path]`.
//! Both crates import these constants instead of each compiling their own
//! copy of the grammar.

use regex::Regex;
use std::sync::OnceLock;

fn mention_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\[@([A-Za-z0-9_,\-]+):\s*(.*?)\]").expect("valid mention tag regex")
    })
}

fn send_file_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[send_file:\s*([^\]]+)\]").expect("valid send_file tag regex"))
}

/// One `[@agentId,agentId: body]` tag found in raw agent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionTag {
    pub targets: Vec<String>,
    pub body: String,
}

/// Find every mention tag in `text`, in order of first appearance.
pub fn find_mention_tags(text: &str) -> Vec<MentionTag> {
    mention_tag_regex()
        .captures_iter(text)
        .map(|caps| MentionTag {
            targets: caps[1]
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            body: caps[2].trim().to_string(),
        })
        .collect()
}

/// Find every `[send_file: path]` tag, returning the raw path string exactly
/// as written (callers are responsible for resolving/validating it).
pub fn find_send_file_tags(text: &str) -> Vec<String> {
    send_file_tag_regex()
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// Remove every mention tag and send_file tag from `text`, leaving the
/// surrounding prose intact. This is the single strip routine shared by the
/// response assembler so "no control tag leaks to a channel" is enforced by
/// one code path.
pub fn strip_control_tags(text: &str) -> String {
    let without_mentions = mention_tag_regex().replace_all(text, "");
    let without_send_file = send_file_tag_regex().replace_all(&without_mentions, "");
    collapse_blank_lines(&without_send_file)
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_single_mention_tag() {
        let tags = find_mention_tags("intro [@researcher: please check this] outro");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].targets, vec!["researcher"]);
        assert_eq!(tags[0].body, "please check this");
    }

    #[test]
    fn finds_multi_target_mention_tag() {
        let tags = find_mention_tags("[@alpha,beta: fan out this]");
        assert_eq!(tags[0].targets, vec!["alpha", "beta"]);
    }

    #[test]
    fn finds_send_file_tag() {
        let paths = find_send_file_tags("done [send_file: /work/files/report.pdf] thanks");
        assert_eq!(paths, vec!["/work/files/report.pdf".to_string()]);
    }

    #[test]
    fn strip_control_tags_removes_both_kinds_and_no_residue_remains() {
        let text = "Hello [@teammate: go check] world [send_file: /work/files/a.txt] done.";
        let stripped = strip_control_tags(text);
        assert!(!stripped.contains("[@"));
        assert!(!stripped.contains("[send_file"));
        assert!(stripped.contains("Hello"));
        assert!(stripped.contains("world"));
        assert!(stripped.contains("done."));
    }

    #[test]
    fn strip_control_tags_is_idempotent_on_plain_text() {
        let text = "just a plain reply with no tags";
        assert_eq!(strip_control_tags(text), text);
    }
}
