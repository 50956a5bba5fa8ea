//! Drives one agent invocation: spawn the agent's subprocess, feed it the
//! prompt, parse its JSON-lines stdout into assistant text / tool activity /
//! session-id events, and surface a non-zero exit as a typed error.
//!
//! The trait + registry + stub-double shape is adapted from
//! `clawhive-provider/src/lib.rs`'s `LlmProvider` trait and `StubProvider`,
//! changing the mechanism from an HTTP chat call to a subprocess spawn with
//! JSON-lines streaming, per this crate's actual contract.

pub mod event;
pub mod subprocess;

pub use event::{AgentEvent, SESSION_ID_PATTERN};
pub use subprocess::SubprocessInvoker;

use async_trait::async_trait;
use thiserror::Error;
use tinyclaw_schema::AgentConfig;

#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("failed to spawn agent process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("agent process exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("io error communicating with agent process: {0}")]
    Io(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InvokerError>;

#[derive(Debug, Clone, Default)]
pub struct InvocationOutcome {
    pub text: String,
    pub session_id: Option<String>,
    pub activity: Vec<String>,
}

/// One agent invocation request: the agent's static config, the prompt text
/// (already assembled by the caller — persona, memory context, conversation
/// history), and the prior session id to resume, if any.
pub struct InvocationRequest<'a> {
    pub agent: &'a AgentConfig,
    pub prompt: String,
    pub session_id: Option<String>,
}

#[async_trait]
pub trait AgentProvider: Send + Sync {
    async fn invoke(&self, request: InvocationRequest<'_>) -> Result<InvocationOutcome>;
}

/// Test/dry-run double: returns a fixed, deterministic reply without
/// spawning anything. Directly modeled on `clawhive-provider`'s
/// `StubProvider`.
pub struct StubInvoker {
    pub reply_prefix: String,
}

impl StubInvoker {
    pub fn new(reply_prefix: impl Into<String>) -> Self {
        Self {
            reply_prefix: reply_prefix.into(),
        }
    }
}

#[async_trait]
impl AgentProvider for StubInvoker {
    async fn invoke(&self, request: InvocationRequest<'_>) -> Result<InvocationOutcome> {
        Ok(InvocationOutcome {
            text: format!("[{}:{}] {}", self.reply_prefix, request.agent.id, request.prompt),
            session_id: request.session_id.or_else(|| Some("stub-session".to_string())),
            activity: vec![],
        })
    }
}
