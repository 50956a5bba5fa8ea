use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::routing::{AgentConfig, TeamConfig};

/// Gate mode controlling when `tinyclaw-memory` attempts a retrieval before
/// an agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryGateMode {
    Never,
    Always,
    Rule,
    RuleThenLlm,
}

impl Default for MemoryGateMode {
    fn default() -> Self {
        MemoryGateMode::Rule
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub gate_mode: MemoryGateMode,
    #[serde(default)]
    pub force_patterns: Vec<String>,
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    #[serde(default = "default_hook_budget_ms")]
    pub hook_budget_ms: u64,
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
}

fn default_hook_budget_ms() -> u64 {
    8000
}

fn default_safety_margin_ms() -> u64 {
    500
}

fn default_max_snippet_chars() -> usize {
    1200
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            gate_mode: MemoryGateMode::default(),
            force_patterns: Vec::new(),
            skip_patterns: Vec::new(),
            hook_budget_ms: default_hook_budget_ms(),
            safety_margin_ms: default_safety_margin_ms(),
            max_snippet_chars: default_max_snippet_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default = "default_hook_timeout_ms")]
    pub hook_timeout_ms: u64,
}

fn default_hook_timeout_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    #[serde(default)]
    pub require_sender_allowlist: bool,
    #[serde(default)]
    pub allowed_senders: Vec<String>,
    #[serde(default)]
    pub allow_outbound_file_paths_outside_files_dir: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            require_sender_allowlist: false,
            allowed_senders: Vec::new(),
            allow_outbound_file_paths_outside_files_dir: false,
        }
    }
}

impl SecurityPolicy {
    /// `sender_id` is `None` when a channel adapter couldn't supply a stable
    /// id; such a sender can never satisfy an enabled allowlist.
    pub fn sender_allowed(&self, sender_id: Option<&str>) -> bool {
        if !self.require_sender_allowlist {
            return true;
        }
        match sender_id {
            Some(id) => self.allowed_senders.iter().any(|s| s == id),
            None => false,
        }
    }
}

/// Full on-disk settings document, loaded fresh once per dispatch tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub workspace_path: PathBuf,
    #[serde(default)]
    pub default_agent: String,
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub teams: HashMap<String, TeamConfig>,
    #[serde(default)]
    pub security: SecurityPolicy,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}
