//! Durable, crash-safe message queue backed by the filesystem.
//!
//! Five directories live under the workspace root: `incoming/`,
//! `processing/`, `outgoing/`, `events/`, `files/`. Every transition between
//! them is a single `rename` (or a write-to-temp-then-rename for brand new
//! files), so a crash mid-operation never leaves a record half-written —
//! it is either still in its old location or fully in its new one.
//!
//! Grounded on `clawhive-memory`'s `session.rs` append/rename idioms,
//! generalized from "append a JSONL line" to "move a whole file between
//! queue directories".

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tinyclaw_schema::{IncomingMessage, OutgoingResponse};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed queue record at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, QueueError>;

fn io_err(path: &Path, source: std::io::Error) -> QueueError {
    QueueError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A message that has been moved into `processing/` and is now owned by
/// exactly one scheduler worker.
#[derive(Debug)]
pub struct ClaimedMessage {
    pub path: PathBuf,
    pub message: IncomingMessage,
}

pub struct FileQueue {
    incoming: PathBuf,
    processing: PathBuf,
    outgoing: PathBuf,
    events: PathBuf,
    files: PathBuf,
}

impl FileQueue {
    /// Open (creating if necessary) the five queue directories under
    /// `workspace_root`.
    pub fn open(workspace_root: &Path) -> Result<Self> {
        let incoming = workspace_root.join("incoming");
        let processing = workspace_root.join("processing");
        let outgoing = workspace_root.join("outgoing");
        let events = workspace_root.join("events");
        let files = workspace_root.join("files");

        for dir in [&incoming, &processing, &outgoing, &events, &files] {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        Ok(Self {
            incoming,
            processing,
            outgoing,
            events,
            files,
        })
    }

    pub fn files_dir(&self) -> &Path {
        &self.files
    }

    pub fn events_dir(&self) -> &Path {
        &self.events
    }

    pub fn outgoing_dir(&self) -> &Path {
        &self.outgoing
    }

    pub fn incoming_dir(&self) -> &Path {
        &self.incoming
    }

    /// Write a brand new message straight into `incoming/`, write-temp-then-
    /// rename. Used for internally generated branch messages (a teammate
    /// mention fan-out) exactly as if a channel adapter had written it.
    pub async fn submit_incoming(&self, message: &IncomingMessage, file_name: &str) -> Result<()> {
        let final_path = self.incoming.join(file_name);
        let tmp_path = self.incoming.join(format!(".tmp-{}", Uuid::new_v4()));

        let body = serde_json::to_vec(message).map_err(|e| QueueError::Malformed {
            path: final_path.clone(),
            source: e,
        })?;
        tokio::fs::write(&tmp_path, &body)
            .await
            .map_err(|e| io_err(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| io_err(&tmp_path, e))?;
        Ok(())
    }

    /// Claim the oldest message waiting in `incoming/`, atomically moving it
    /// into `processing/`. Returns `Ok(None)` if nothing is waiting.
    ///
    /// "Oldest" is by filesystem modification time, not filename, since
    /// channel adapters are free to choose any file name as long as it is
    /// unique.
    pub async fn claim(&self) -> Result<Option<ClaimedMessage>> {
        let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&self.incoming)
            .await
            .map_err(|e| io_err(&self.incoming, e))?;
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| io_err(&self.incoming, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = entry
                .metadata()
                .await
                .map_err(|e| io_err(&path, e))?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((modified, path));
        }

        candidates.sort_by_key(|(mtime, _)| *mtime);

        // Malformed records are deleted, not returned as an error: a single
        // bad file must not strand itself in `processing/` forever or abort
        // the rest of this tick's claims.
        for (_, oldest) in candidates {
            let dest = self.processing.join(oldest.file_name().expect("has filename"));
            match tokio::fs::rename(&oldest, &dest).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Another worker claimed it between our scan and our rename.
                    continue;
                }
                Err(e) => return Err(io_err(&oldest, e)),
            }

            let raw = tokio::fs::read_to_string(&dest)
                .await
                .map_err(|e| io_err(&dest, e))?;
            match serde_json::from_str::<IncomingMessage>(&raw) {
                Ok(message) => {
                    info!(path = %dest.display(), message_id = %message.message_id, "claimed message");
                    return Ok(Some(ClaimedMessage { path: dest, message }));
                }
                Err(e) => {
                    warn!(path = %dest.display(), error = %e, "deleting malformed queue record instead of stranding it");
                    let _ = tokio::fs::remove_file(&dest).await;
                    continue;
                }
            }
        }

        Ok(None)
    }

    /// Put a claimed message back into `incoming/`, for transient failures
    /// that should be retried on a later tick.
    pub async fn release(&self, claimed: ClaimedMessage) -> Result<()> {
        let dest = self
            .incoming
            .join(claimed.path.file_name().expect("has filename"));
        tokio::fs::rename(&claimed.path, &dest)
            .await
            .map_err(|e| io_err(&claimed.path, e))?;
        warn!(path = %dest.display(), "released message back to incoming");
        Ok(())
    }

    /// Remove a claimed message from `processing/` once it has been fully
    /// handled (its response, if any, has already been committed via
    /// `commit_out`).
    pub async fn ack(&self, claimed: &ClaimedMessage) -> Result<()> {
        tokio::fs::remove_file(&claimed.path)
            .await
            .map_err(|e| io_err(&claimed.path, e))
    }

    /// Write a response into `outgoing/`, write-temp-then-rename so a reader
    /// polling the directory never observes a partially written file.
    pub async fn commit_out(&self, response: &OutgoingResponse) -> Result<PathBuf> {
        let final_path = self.outgoing.join(response.file_name());
        let tmp_path = self
            .outgoing
            .join(format!(".tmp-{}", Uuid::new_v4()));

        let body = serde_json::to_vec_pretty(response).map_err(|e| QueueError::Malformed {
            path: final_path.clone(),
            source: e,
        })?;
        tokio::fs::write(&tmp_path, &body)
            .await
            .map_err(|e| io_err(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| io_err(&tmp_path, e))?;

        info!(path = %final_path.display(), "committed outgoing response");
        Ok(final_path)
    }

    /// Move every file still in `processing/` back into `incoming/`. Called
    /// once at startup to recover from a crash that happened mid-invocation:
    /// at-least-once delivery means it is safe (and required) to redeliver
    /// anything that was claimed but never acked.
    pub async fn recover(&self) -> Result<usize> {
        let mut recovered = 0usize;
        let mut read_dir = tokio::fs::read_dir(&self.processing)
            .await
            .map_err(|e| io_err(&self.processing, e))?;
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| io_err(&self.processing, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let dest = self.incoming.join(path.file_name().expect("has filename"));
            tokio::fs::rename(&path, &dest)
                .await
                .map_err(|e| io_err(&path, e))?;
            warn!(path = %dest.display(), "recovered stranded message after restart");
            recovered += 1;
        }
        Ok(recovered)
    }
}
