//! Turns one agent's raw output into a final, channel-safe response: strips
//! every control tag, validates any `[send_file: ...]` paths against the
//! outbound file policy, and offloads overly long replies to a file with a
//! short preview in their place.
//!
//! Tag stripping reuses the shared grammar in `tinyclaw_schema::tags` so
//! this crate and `tinyclaw-conversation`'s mention parser can never drift
//! apart on what counts as a control tag. The long-response / file-offload
//! behavior is grounded on the teacher's general "never hand raw model
//! output to a channel unfiltered" post-processing idiom
//! (`clawhive-core/src/orchestrator.rs`'s `filter_no_reply`).

use std::path::{Path, PathBuf};

use chrono::Utc;
use tinyclaw_schema::{find_send_file_tags, strip_control_tags, SecurityPolicy};
use tracing::warn;

/// Responses longer than this are written to a file instead of sent whole.
pub const LONG_RESPONSE_THRESHOLD_CHARS: usize = 4000;
/// How much of the long response is still shown inline as a preview.
pub const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledResponse {
    pub message: String,
    pub files: Vec<PathBuf>,
}

/// Assemble a final response from one agent's raw output.
///
/// `files_dir` is the workspace's `files/` directory, both the landing spot
/// for long-response offload and the default allowed root for `send_file`
/// tags.
pub async fn finalize(
    raw_text: &str,
    files_dir: &Path,
    security: &SecurityPolicy,
    message_id: &str,
) -> std::io::Result<AssembledResponse> {
    let requested_files = find_send_file_tags(raw_text);
    let mut files = Vec::new();
    for raw_path in requested_files {
        let path = PathBuf::from(&raw_path);
        if is_path_allowed(&path, files_dir, security) {
            files.push(path);
        } else {
            warn!(path = %raw_path, "rejected outbound file path outside files/ directory");
        }
    }

    let clean_text = strip_control_tags(raw_text);

    if clean_text.len() <= LONG_RESPONSE_THRESHOLD_CHARS {
        return Ok(AssembledResponse {
            message: clean_text,
            files,
        });
    }

    let file_path = write_long_response(files_dir, message_id, &clean_text).await?;
    files.push(file_path.clone());

    let preview: String = clean_text.chars().take(PREVIEW_CHARS).collect();
    let message = format!(
        "{preview}...\n\n[Full response saved to {}]",
        file_path.display()
    );

    Ok(AssembledResponse { message, files })
}

fn is_path_allowed(path: &Path, files_dir: &Path, security: &SecurityPolicy) -> bool {
    if security.allow_outbound_file_paths_outside_files_dir {
        return true;
    }
    path.starts_with(files_dir)
}

async fn write_long_response(files_dir: &Path, message_id: &str, text: &str) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(files_dir).await?;
    let ts = Utc::now().format("%Y%m%dT%H%M%S");
    let final_path = files_dir.join(format!("response_{ts}_{message_id}.md"));
    let tmp_path = files_dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp_path, text).await?;
    tokio::fs::rename(&tmp_path, &final_path).await?;
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn permissive_policy() -> SecurityPolicy {
        SecurityPolicy {
            require_sender_allowlist: false,
            allowed_senders: vec![],
            allow_outbound_file_paths_outside_files_dir: false,
        }
    }

    #[tokio::test]
    async fn strips_mention_and_send_file_tags_from_final_message() {
        let tmp = TempDir::new().unwrap();
        let files_dir = tmp.path().join("files");
        let raw = "Here's the answer [@teammate: double check this] and the file [send_file: /nope/out.txt]";
        let assembled = finalize(raw, &files_dir, &permissive_policy(), "m1").await.unwrap();
        assert!(!assembled.message.contains("[@"));
        assert!(!assembled.message.contains("[send_file"));
        assert!(assembled.message.contains("Here's the answer"));
    }

    #[tokio::test]
    async fn send_file_outside_files_dir_is_rejected_by_default() {
        let tmp = TempDir::new().unwrap();
        let files_dir = tmp.path().join("files");
        let raw = "done [send_file: /etc/passwd]";
        let assembled = finalize(raw, &files_dir, &permissive_policy(), "m1").await.unwrap();
        assert!(assembled.files.is_empty());
    }

    #[tokio::test]
    async fn send_file_outside_files_dir_is_allowed_when_policy_opts_in() {
        let tmp = TempDir::new().unwrap();
        let files_dir = tmp.path().join("files");
        let policy = SecurityPolicy {
            allow_outbound_file_paths_outside_files_dir: true,
            ..permissive_policy()
        };
        let raw = "done [send_file: /tmp/report.pdf]";
        let assembled = finalize(raw, &files_dir, &policy, "m1").await.unwrap();
        assert_eq!(assembled.files, vec![PathBuf::from("/tmp/report.pdf")]);
    }

    #[tokio::test]
    async fn send_file_inside_files_dir_is_always_allowed() {
        let tmp = TempDir::new().unwrap();
        let files_dir = tmp.path().join("files");
        let inside = files_dir.join("report.pdf");
        let raw = format!("done [send_file: {}]", inside.display());
        let assembled = finalize(&raw, &files_dir, &permissive_policy(), "m1").await.unwrap();
        assert_eq!(assembled.files, vec![inside]);
    }

    #[tokio::test]
    async fn long_response_is_offloaded_to_a_file_with_a_preview() {
        let tmp = TempDir::new().unwrap();
        let files_dir = tmp.path().join("files");
        let long_text = "a".repeat(LONG_RESPONSE_THRESHOLD_CHARS + 1);
        let assembled = finalize(&long_text, &files_dir, &permissive_policy(), "m1").await.unwrap();
        assert_eq!(assembled.files.len(), 1);
        assert!(assembled.message.len() < long_text.len());
        assert!(assembled.message.contains("Full response saved to"));

        let saved = tokio::fs::read_to_string(&assembled.files[0]).await.unwrap();
        assert_eq!(saved, long_text);
    }

    #[tokio::test]
    async fn response_exactly_at_threshold_is_not_offloaded() {
        let tmp = TempDir::new().unwrap();
        let files_dir = tmp.path().join("files");
        let text = "a".repeat(LONG_RESPONSE_THRESHOLD_CHARS);
        let assembled = finalize(&text, &files_dir, &permissive_policy(), "m1").await.unwrap();
        assert!(assembled.files.is_empty());
        assert_eq!(assembled.message, text);
    }

    #[tokio::test]
    async fn long_response_offload_writes_via_temp_file_then_rename() {
        let tmp = TempDir::new().unwrap();
        let files_dir = tmp.path().join("files");
        let long_text = "b".repeat(LONG_RESPONSE_THRESHOLD_CHARS + 1);
        finalize(&long_text, &files_dir, &permissive_policy(), "m1").await.unwrap();

        let mut entries = tokio::fs::read_dir(&files_dir).await.unwrap();
        let mut names = vec![];
        while let Some(e) = entries.next_entry().await.unwrap() {
            names.push(e.file_name().to_string_lossy().to_string());
        }
        assert!(names.iter().all(|n| !n.starts_with(".tmp-")));
    }
}
