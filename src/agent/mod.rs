//! Client for the hosted card-writing agent.
//!
//! The agent answers with a stream of [`AgentMessage`]s. [`AgentClient`]
//! always drains that stream to the end, even after an error shows up, and
//! only then reports the first error it saw.

use std::{
    fmt,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use futures::{
    stream::BoxStream,
    StreamExt,
};
use serde_json::Value;
use tracing::{
    debug,
    error,
    info,
    warn,
};

use crate::core::{
    models::CardCandidate,
    utils::{
        preview,
        PREVIEW_MEDIUM,
        PREVIEW_SHORT,
    },
    GenerationError,
};

pub mod cli;
pub mod messages;

pub use cli::ClaudeCliTransport;
pub use messages::{
    AgentMessage,
    ContentBlock,
    ResultMessage,
};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_MAX_TURNS: u32 = 1;

pub type StderrCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub type MessageStream = BoxStream<'static, Result<AgentMessage, GenerationError>>;

#[derive(Clone)]
pub struct AgentOptions {
    pub model: String,
    pub max_turns: u32,
    pub allowed_tools: Vec<String>,
    /// Receives each non-empty diagnostic line the agent writes.
    pub stderr: StderrCallback,
    pub timeout: Option<Duration>,
}

impl fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentOptions")
            .field("model", &self.model)
            .field("max_turns", &self.max_turns)
            .field("allowed_tools", &self.allowed_tools)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
            allowed_tools: Vec::new(),
            stderr: Arc::new(log_stderr_line),
            timeout: None,
        }
    }
}

fn log_stderr_line(line: &str) {
    warn!(line, "agent stderr");
}

/// Source of agent message streams.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn open(
        &self,
        prompt: &str,
        options: &AgentOptions,
    ) -> Result<MessageStream, GenerationError>;
}

/// Anything that turns a prompt into the agent's full text answer.
#[async_trait]
pub trait CardAgent: Send + Sync {
    async fn run_query(&self, prompt: &str) -> Result<String, GenerationError>;
}

pub struct AgentClient<T> {
    transport: T,
    options: AgentOptions,
}

impl<T: AgentTransport> AgentClient<T> {
    pub fn new(transport: T, options: AgentOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    async fn drain(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!("starting agent query");
        let mut stream = self.transport.open(prompt, &self.options).await?;

        let mut collected: Vec<String> = Vec::new();
        let mut failure: Option<GenerationError> = None;

        while let Some(item) = stream.next().await {
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "error during agent query");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                    continue;
                }
            };
            debug!(kind = message.kind(), "received agent message");

            match message {
                AgentMessage::System { subtype } => {
                    debug!(?subtype, "agent session initialised");
                }
                AgentMessage::Assistant { message } => {
                    for block in message.content {
                        if let ContentBlock::Text { text } = block {
                            if !text.is_empty() {
                                debug!(preview = preview(&text, PREVIEW_SHORT), "text block");
                                collected.push(text);
                            }
                        }
                    }
                }
                AgentMessage::Result(result) => {
                    debug!(
                        subtype = ?result.subtype,
                        is_error = result.is_error,
                        duration_ms = ?result.duration_ms,
                        num_turns = ?result.num_turns,
                        "agent query complete"
                    );
                    if result.is_error {
                        let e = GenerationError::AgentFailed {
                            subtype: result.subtype.unwrap_or_else(|| "unknown".to_string()),
                            detail: result
                                .result
                                .filter(|r| !r.is_empty())
                                .map(|r| preview(&r, PREVIEW_MEDIUM).to_string()),
                        };
                        error!(error = %e, "agent reported failure");
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                }
                AgentMessage::Other => {}
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        if collected.is_empty() {
            error!("no text content received from agent");
            return Err(GenerationError::NoContent);
        }

        let text = collected.concat();
        debug!(preview = preview(&text, PREVIEW_MEDIUM), "agent result");
        Ok(text)
    }
}

#[async_trait]
impl<T: AgentTransport> CardAgent for AgentClient<T> {
    async fn run_query(&self, prompt: &str) -> Result<String, GenerationError> {
        match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, self.drain(prompt))
                .await
                .map_err(|_| GenerationError::Timeout(limit))?,
            None => self.drain(prompt).await,
        }
    }
}

/// Removes an outer Markdown code fence, if the text starts with one.
pub fn strip_code_fence(text: &str) -> String {
    let text = text.trim();
    if !text.starts_with("```") {
        return text.to_string();
    }

    text.lines()
        .skip(1)
        .take_while(|line| !line.starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses the agent's answer into unvalidated card candidates.
pub fn parse_cards_response(text: &str) -> Result<Vec<CardCandidate>, GenerationError> {
    let body = strip_code_fence(text);
    let mut data: Value = serde_json::from_str(&body).map_err(|e| {
        error!(error = %e, response = preview(text, PREVIEW_MEDIUM), "failed to parse agent JSON");
        GenerationError::UnparseableResponse
    })?;

    match data.get_mut("cards").map(Value::take) {
        Some(Value::Array(cards)) => {
            info!(count = cards.len(), "parsed card candidates");
            Ok(cards.into_iter().map(CardCandidate).collect())
        }
        Some(_) => Err(GenerationError::MalformedResponse("'cards' must be a list".to_string())),
        None => Err(GenerationError::MalformedResponse("Response missing 'cards' key".to_string())),
    }
}
