//! Unified error type for the crate.
//!
//! `AppError` is the single error enum crossed by every layer; `AppResult`
//! is the crate-wide result alias. External failures that stay recoverable
//! (a failed SQL execution inside the repair loop) are carried as raw
//! message strings instead, because their text is classifier input.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector store error: {0}")]
    VectorStore(#[from] lancedb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Missing or malformed configuration, including a missing API key.
    #[error("config error: {0}")]
    Config(String),

    /// The embedding service call failed. Disambiguation treats this as
    /// "no match" for the affected column instead of aborting.
    #[error("embedding service error: {0}")]
    Embedding(String),

    /// The language model call failed or returned unusable output.
    #[error("language model error: {0}")]
    Llm(String),

    /// The repair collaborator failed. Consumes retry budget in the loop.
    #[error("query repair error: {0}")]
    Repair(String),

    /// A named table could not be introspected. Callers that scan many
    /// tables skip the failed one rather than abort the batch.
    #[error("schema introspection failed for {table}: {detail}")]
    Introspection { table: String, detail: String },
}

/// Crate-wide result alias.
pub type AppResult<T> = Result<T, AppError>;

/// Context helpers for tagging foreign errors with a domain variant.
pub trait ResultExt<T> {
    fn config_err(self, msg: &str) -> AppResult<T>;
    fn embedding_err(self, msg: &str) -> AppResult<T>;
    fn llm_err(self, msg: &str) -> AppResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn config_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Config(format!("{}: {}", msg, e)))
    }

    fn embedding_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Embedding(format!("{}: {}", msg, e)))
    }

    fn llm_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Llm(format!("{}: {}", msg, e)))
    }
}
