use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct MemorySnippet {
    pub text: String,
    pub base_score: f64,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory store error: {0}")]
    Backend(String),
}

/// The retrieval contract the prefetch pipeline calls through. The real
/// production memory store (embeddings, long-term consolidation, etc.) is
/// an external collaborator; this trait is the boundary.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn search(
        &self,
        channel: &str,
        sender_id: &str,
        agent_id: &str,
        query: &str,
    ) -> Result<Vec<MemorySnippet>, MemoryError>;
}

/// A minimal embedded store, backed by `rusqlite`, for local development and
/// for the bookkeeping this core needs even when no external memory service
/// is configured: a flat table of (scope, text, score) rows, substring
/// matched. Matches `clawhive-memory`'s choice of `rusqlite` for a small
/// on-disk index rather than standing up a separate database service.
pub struct SqliteMemoryStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteMemoryStore {
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        Self::from_connection(
            rusqlite::Connection::open_in_memory().map_err(|e| MemoryError::Backend(e.to_string()))?,
        )
    }

    /// Open (creating if necessary) a file-backed store, so the daemon's
    /// embedded bookkeeping memory survives a restart even when no external
    /// memory service is configured.
    pub fn open(path: &std::path::Path) -> Result<Self, MemoryError> {
        Self::from_connection(
            rusqlite::Connection::open(path).map_err(|e| MemoryError::Backend(e.to_string()))?,
        )
    }

    fn from_connection(conn: rusqlite::Connection) -> Result<Self, MemoryError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS memories (
                channel TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                text TEXT NOT NULL,
                score REAL NOT NULL
            )",
            [],
        )
        .map_err(|e| MemoryError::Backend(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn remember(
        &self,
        channel: &str,
        sender_id: &str,
        agent_id: &str,
        text: &str,
        score: f64,
    ) -> Result<(), MemoryError> {
        let conn = self.conn.lock().expect("memory store mutex poisoned");
        conn.execute(
            "INSERT INTO memories (channel, sender_id, agent_id, text, score) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![channel, sender_id, agent_id, text, score],
        )
        .map_err(|e| MemoryError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn search(
        &self,
        channel: &str,
        sender_id: &str,
        agent_id: &str,
        query: &str,
    ) -> Result<Vec<MemorySnippet>, MemoryError> {
        let conn = self.conn.lock().expect("memory store mutex poisoned");
        let like = format!("%{query}%");
        let mut stmt = conn
            .prepare(
                "SELECT text, score FROM memories
                 WHERE channel = ?1 AND sender_id = ?2 AND agent_id = ?3 AND text LIKE ?4
                 ORDER BY score DESC",
            )
            .map_err(|e| MemoryError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![channel, sender_id, agent_id, like], |row| {
                Ok(MemorySnippet {
                    text: row.get(0)?,
                    base_score: row.get(1)?,
                })
            })
            .map_err(|e| MemoryError::Backend(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| MemoryError::Backend(e.to_string()))?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_scoped_by_channel_sender_and_agent() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        store
            .remember("telegram", "1", "default", "user likes dark roast coffee", 0.9)
            .unwrap();
        store
            .remember("telegram", "2", "default", "user likes tea", 0.9)
            .unwrap();

        let results = store.search("telegram", "1", "default", "coffee").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].text.contains("dark roast"));

        let none = store.search("telegram", "2", "default", "coffee").await.unwrap();
        assert!(none.is_empty());
    }
}
