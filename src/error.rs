//! Error taxonomy for the chat pipeline.
//!
//! Startup failures ([`RagError::MissingCredential`], [`RagError::MissingDataDir`],
//! [`RagError::NoDocuments`]) abort the process. Collaborator failures
//! ([`RagError::Embedding`], [`RagError::Completion`]) are per-turn: the
//! surface shows them inline and the conversation is left untouched.

use thiserror::Error;

/// Errors produced by the loader, index, synthesizer, and session layers.
#[derive(Debug, Error)]
pub enum RagError {
    /// A caller passed a value outside the accepted domain (`k < 1`, blank query, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The API key environment variable for a hosted model is not set.
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    /// The configured document root does not exist.
    #[error("data directory does not exist: {0}")]
    MissingDataDir(String),

    /// Loading finished without producing a single document.
    #[error("no documents found under {0}; add .md, .txt, or .pdf files")]
    NoDocuments(String),

    /// The embedding collaborator failed.
    #[error("embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    /// The completion collaborator failed, before or during streaming.
    #[error("completion error ({provider}): {message}")]
    Completion { provider: String, message: String },

    /// The persisted index could not be read or written.
    #[error("index storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The chat surface could not accept output (e.g. the client went away).
    #[error("chat surface closed: {0}")]
    Surface(String),
}

impl RagError {
    pub fn embedding(provider: &str, message: impl Into<String>) -> Self {
        RagError::Embedding {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn completion(provider: &str, message: impl Into<String>) -> Self {
        RagError::Completion {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// True for failures that only affect the current turn.
    pub fn is_per_turn(&self) -> bool {
        matches!(
            self,
            RagError::InvalidArgument(_)
                | RagError::Embedding { .. }
                | RagError::Completion { .. }
                | RagError::Surface(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
