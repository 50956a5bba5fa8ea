use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::event::{classify_line, AgentEvent};
use crate::{AgentProvider, InvocationOutcome, InvocationRequest, InvokerError, Result};

/// The production `AgentProvider`: spawns the agent's configured command,
/// writes the prompt to its stdin, and streams its stdout line by line.
pub struct SubprocessInvoker;

impl Default for SubprocessInvoker {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl AgentProvider for SubprocessInvoker {
    async fn invoke(&self, request: InvocationRequest<'_>) -> Result<InvocationOutcome> {
        let agent = request.agent;
        let mut command = Command::new(&agent.command);
        command
            .args(&agent.args)
            .envs(&agent.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(session_id) = &request.session_id {
            command.env("TINYCLAW_SESSION_ID", session_id);
        }
        if let Some(dir) = &agent.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(InvokerError::Spawn)?;

        {
            use tokio::io::AsyncWriteExt;
            let mut stdin = child.stdin.take().expect("stdin was piped");
            stdin
                .write_all(request.prompt.as_bytes())
                .await
                .map_err(InvokerError::Io)?;
            stdin.shutdown().await.map_err(InvokerError::Io)?;
        }

        let stdout = child.stdout.take().expect("stdout was piped");
        let mut lines = BufReader::new(stdout).lines();

        let mut assistant_text = Vec::new();
        let mut activity = Vec::new();
        let mut session_id = request.session_id.clone();

        while let Some(line) = lines.next_line().await.map_err(InvokerError::Io)? {
            match classify_line(&line) {
                AgentEvent::AssistantText(text) => assistant_text.push(text),
                AgentEvent::ToolActivity(detail) => {
                    debug!(agent_id = %agent.id, detail, "tool activity");
                    activity.push(detail);
                }
                AgentEvent::SessionId(id) => session_id = Some(id),
                AgentEvent::Unrecognized(text) if !text.is_empty() => assistant_text.push(text),
                AgentEvent::Unrecognized(_) => {}
            }
        }

        let status = child.wait().await.map_err(InvokerError::Io)?;
        if !status.success() {
            let mut stderr_buf = String::new();
            if let Some(mut stderr) = child.stderr.take() {
                let _ = stderr.read_to_string(&mut stderr_buf).await;
            }
            warn!(agent_id = %agent.id, code = ?status.code(), "agent process exited non-zero");
            return Err(InvokerError::NonZeroExit {
                code: status.code(),
                stderr: stderr_buf,
            });
        }

        Ok(InvocationOutcome {
            text: assistant_text.join("\n"),
            session_id,
            activity,
        })
    }
}
