pub mod errors;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod utils;
pub mod validator;

pub use errors::{
    AnkiConnectError,
    CardError,
    ConfigError,
    FailureKind,
    GenerationError,
};
pub use models::{
    AnkiConfig,
    CardCandidate,
    CardType,
    DraftCard,
    GeneratedCard,
    Source,
};
pub use pipeline::CardGenerator;
