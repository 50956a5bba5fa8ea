use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

/// Appends one JSONL line per conversation turn to a per-team transcript
/// file, named with the ISO-8601 UTC timestamp of the conversation's start.
/// Modeled on `clawhive-memory`'s `SessionWriter`: append-only, tolerant of
/// a missing directory on first use.
pub struct TranscriptWriter {
    root: PathBuf,
}

#[derive(Debug, Serialize)]
struct TranscriptLine<'a> {
    at: chrono::DateTime<Utc>,
    agent_id: &'a str,
    role: &'a str,
    body: &'a str,
}

impl TranscriptWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn team_dir(&self, team_id: &str) -> PathBuf {
        self.root.join("transcripts").join(team_id)
    }

    fn file_name_for(started_at: chrono::DateTime<Utc>) -> String {
        format!("{}.jsonl", started_at.format("%Y%m%dT%H%M%S%.3fZ"))
    }

    /// Append one line to the transcript for `team_id`, started at
    /// `started_at`. Creates the team directory and/or file on first write.
    pub async fn append(
        &self,
        team_id: &str,
        started_at: chrono::DateTime<Utc>,
        agent_id: &str,
        role: &str,
        body: &str,
    ) -> std::io::Result<PathBuf> {
        let dir = self.team_dir(team_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(Self::file_name_for(started_at));

        let line = TranscriptLine {
            at: Utc::now(),
            agent_id,
            role,
            body,
        };
        let mut serialized = serde_json::to_string(&line).expect("transcript line always serializes");
        serialized.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;
        file.write_all(serialized.as_bytes()).await?;
        Ok(path)
    }

    pub async fn read_lines(&self, path: &Path) -> std::io::Result<Vec<String>> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(content.lines().map(|l| l.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn append_creates_team_directory_and_file() {
        let tmp = TempDir::new().unwrap();
        let writer = TranscriptWriter::new(tmp.path());
        let started = Utc::now();

        let path = writer
            .append("alpha", started, "leader", "assistant", "hello")
            .await
            .unwrap();

        assert!(path.exists());
        let lines = writer.read_lines(&path).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("hello"));
    }

    #[tokio::test]
    async fn multiple_appends_go_to_the_same_file_in_order() {
        let tmp = TempDir::new().unwrap();
        let writer = TranscriptWriter::new(tmp.path());
        let started = Utc::now();

        writer.append("alpha", started, "leader", "user", "first").await.unwrap();
        let path = writer
            .append("alpha", started, "leader", "assistant", "second")
            .await
            .unwrap();

        let lines = writer.read_lines(&path).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("first"));
        assert!(lines[1].contains("second"));
    }
}
