//! Runs the agent CLI in streaming JSON mode.
//!
//! The prompt goes to stdin, each stdout line is one [`AgentMessage`], and
//! stderr lines are handed to the options' diagnostic callback. The child is
//! spawned with `kill_on_drop(true)`, so dropping the stream (for example on
//! a deadline) kills it.

use std::{
    path::PathBuf,
    process::Stdio,
};

use async_trait::async_trait;
use futures::{
    stream,
    StreamExt,
};
use tokio::{
    io::{
        AsyncBufReadExt,
        AsyncWriteExt,
        BufReader,
        Lines,
    },
    process::{
        Child,
        ChildStdout,
        Command,
    },
};
use tracing::debug;

use super::{
    AgentMessage,
    AgentOptions,
    AgentTransport,
    MessageStream,
};
use crate::core::GenerationError;

pub struct ClaudeCliTransport {
    program: PathBuf,
}

impl ClaudeCliTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn command(&self, options: &AgentOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--print")
            .args(["--output-format", "stream-json", "--verbose"])
            .arg("--model")
            .arg(&options.model)
            .arg("--max-turns")
            .arg(options.max_turns.to_string());
        if !options.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(options.allowed_tools.join(","));
        }
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        cmd
    }
}

struct CliStream {
    lines: Lines<BufReader<ChildStdout>>,
    child: Option<Child>,
    done: bool,
}

fn decode_line(line: &str) -> Result<AgentMessage, GenerationError> {
    serde_json::from_str(line)
        .map_err(|e| GenerationError::Transport(format!("undecodable agent message: {e}")))
}

#[async_trait]
impl AgentTransport for ClaudeCliTransport {
    async fn open(
        &self,
        prompt: &str,
        options: &AgentOptions,
    ) -> Result<MessageStream, GenerationError> {
        debug!(program = %self.program.display(), model = %options.model, "spawning agent CLI");
        let mut child = self.command(options).spawn().map_err(|e| {
            GenerationError::Transport(format!(
                "failed to start {}: {e}",
                self.program.display()
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| GenerationError::Transport(format!("failed to send prompt: {e}")))?;
        }

        if let Some(stderr) = child.stderr.take() {
            let callback = options.stderr.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        callback(&line);
                    }
                }
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GenerationError::Transport("agent stdout unavailable".to_string()))?;
        let state =
            CliStream { lines: BufReader::new(stdout).lines(), child: Some(child), done: false };

        let messages = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                match state.lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => return Some((decode_line(&line), state)),
                    Ok(None) => {
                        state.done = true;
                        let mut child = state.child.take()?;
                        let item = match child.wait().await {
                            Ok(status) if status.success() => return None,
                            Ok(status) => Err(GenerationError::Transport(format!(
                                "agent CLI exited with {status}"
                            ))),
                            Err(e) => Err(GenerationError::Transport(e.to_string())),
                        };
                        return Some((item, state));
                    }
                    Err(e) => {
                        state.done = true;
                        return Some((Err(GenerationError::Transport(e.to_string())), state));
                    }
                }
            }
        });

        Ok(messages.boxed())
    }
}
