//! Japanese vocabulary flashcards written by an LLM agent, checked and
//! repaired before they reach Anki.

pub mod agent;
pub mod anki;
pub mod config;
pub mod context;
pub mod core;
pub mod export;
pub mod logging;

pub use context::AppContext;
pub use crate::core::{
    CardError,
    CardGenerator,
    CardType,
    DraftCard,
    FailureKind,
    GeneratedCard,
};
