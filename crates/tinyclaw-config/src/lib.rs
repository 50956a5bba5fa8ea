//! Loads and (for the thin admin surface) persists the settings document.
//!
//! Settings are re-read fresh at the start of every dispatch tick rather
//! than watched/cached, matching `clawhive-server/src/routes/events.rs`'s
//! `get_metrics` pattern of reading YAML straight off disk whenever a
//! caller asks. Writes go through a temp file and rename, as they do
//! everywhere else durable state is written in this codebase.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tinyclaw_schema::Settings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings document at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings document at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to write settings document at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the settings document fresh. Unknown keys and missing
    /// optional fields are tolerated by `Settings`'s own `#[serde(default)]`
    /// annotations; only a missing/unreadable file or genuinely malformed
    /// YAML is an error here.
    pub async fn load(&self) -> Result<Settings> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigError::Read {
                path: self.path.clone(),
                source: e,
            })?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Write `settings` back out, write-temp-then-rename, for the thin
    /// admin surface. The daemon's own tick loop never calls this — it only
    /// reads.
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        let serialized = serde_yaml::to_string(settings).expect("settings always serialize");
        let tmp_path = self
            .path
            .with_file_name(format!(".tmp-{}-{}", uuid::Uuid::new_v4(), self.file_name()));

        tokio::fs::write(&tmp_path, serialized.as_bytes())
            .await
            .map_err(|e| ConfigError::Write {
                path: tmp_path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| ConfigError::Write {
                path: self.path.clone(),
                source: e,
            })?;
        Ok(())
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "main.yaml".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_parses_a_minimal_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("main.yaml");
        tokio::fs::write(&path, "workspacePath: /var/lib/tinyclaw\ndefaultAgent: default\n")
            .await
            .unwrap();

        let store = ConfigStore::new(&path);
        let settings = store.load().await.unwrap();
        assert_eq!(settings.default_agent, "default");
    }

    #[tokio::test]
    async fn load_surfaces_missing_file_as_error() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path().join("missing.yaml"));
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn save_then_load_round_trips_and_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("main.yaml");
        tokio::fs::write(&path, "workspacePath: /var/lib/tinyclaw\ndefaultAgent: default\n")
            .await
            .unwrap();

        let store = ConfigStore::new(&path);
        let mut settings = store.load().await.unwrap();
        settings.default_agent = "writer".to_string();
        store.save(&settings).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.default_agent, "writer");

        let mut entries = tokio::fs::read_dir(tmp.path()).await.unwrap();
        let mut names = vec![];
        while let Some(e) = entries.next_entry().await.unwrap() {
            names.push(e.file_name().to_string_lossy().to_string());
        }
        assert!(names.iter().all(|n| !n.starts_with(".tmp-")));
    }
}
