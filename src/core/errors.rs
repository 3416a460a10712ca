use std::{
    path::PathBuf,
    time::Duration,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in configuration file: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("I/O error reading configuration: {0}")]
    Io(Box<std::io::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidSetting { name: &'static str, value: String },
}

impl From<std::io::Error> for ConfigError {
    fn from(error: std::io::Error) -> Self {
        ConfigError::Io(Box::new(error))
    }
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Agent returned error (subtype={subtype}){}", detail_suffix(.detail))]
    AgentFailed { subtype: String, detail: Option<String> },

    #[error("No result received from agent")]
    NoContent,

    #[error("Agent transport error: {0}")]
    Transport(String),

    #[error("Agent query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed agent response: {0}")]
    MalformedResponse(String),

    #[error("Failed to parse response from AI model")]
    UnparseableResponse,

    #[error("Card validation failed after {attempts} repair attempts. Errors: {errors:?}")]
    ValidationFailed { attempts: u32, errors: Vec<String> },
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum AnkiConnectError {
    #[error(
        "Cannot connect to AnkiConnect at {url}. Is Anki running with AnkiConnect add-on installed?"
    )]
    Unreachable { url: String },

    #[error("HTTP error communicating with AnkiConnect: {0}")]
    Http(Box<reqwest::Error>),

    #[error("AnkiConnect error: {0}")]
    Api(String),

    #[error("Unexpected AnkiConnect result: {0}")]
    UnexpectedResult(String),

    #[error("AnkiConnect version {0} is too old. Please update.")]
    VersionTooOld(u32),

    #[error("Invalid deck name: {0:?}")]
    InvalidDeckName(String),
}

impl From<reqwest::Error> for AnkiConnectError {
    fn from(error: reqwest::Error) -> Self {
        AnkiConnectError::Http(Box::new(error))
    }
}

#[derive(Error, Debug)]
pub enum CardError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Anki(#[from] AnkiConnectError),

    #[error("Invalid input: {0}")]
    BadInput(String),

    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<std::io::Error> for CardError {
    fn from(error: std::io::Error) -> Self {
        CardError::Io(Box::new(error))
    }
}

/// The only failure categories callers ever see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    BadInput,
    GenerationFailed,
    ServiceUnavailable,
    Configuration,
}

impl FailureKind {
    pub fn public_message(self) -> &'static str {
        match self {
            FailureKind::BadInput => "The request was invalid. Check the input and try again.",
            FailureKind::GenerationFailed => "Card generation failed. Please try again.",
            FailureKind::ServiceUnavailable => {
                "Cannot communicate with Anki. Make sure Anki is running with AnkiConnect."
            }
            FailureKind::Configuration => "The server configuration is invalid or missing.",
        }
    }
}

impl CardError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CardError::Config(_) => FailureKind::Configuration,
            CardError::Generation(_) => FailureKind::GenerationFailed,
            CardError::Anki(AnkiConnectError::InvalidDeckName(_)) => FailureKind::BadInput,
            CardError::Anki(_) => FailureKind::ServiceUnavailable,
            CardError::BadInput(_) | CardError::Json(_) => FailureKind::BadInput,
            CardError::Io(_) => FailureKind::BadInput,
        }
    }

    pub fn public_message(&self) -> &'static str {
        self.kind().public_message()
    }
}
