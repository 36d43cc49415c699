//! Error taxonomy for the recall and indexing paths.
//!
//! Most functions return [`anyhow::Result`]; these variants are raised at
//! the boundaries where callers need to tell failure classes apart and are
//! recovered with `err.downcast_ref::<RecallError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecallError {
    /// A backend is not configured or could not be reached.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// A reachable backend returned an error for a single call.
    #[error("{backend} backend failed: {message}")]
    Backend { backend: String, message: String },

    /// A single file failed to read, chunk, or write.
    #[error("failed to index {file}: {message}")]
    IndexFile { file: String, message: String },

    /// Required configuration or credentials are missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The persisted index state could not be read or written.
    #[error("index state error: {0}")]
    State(String),
}

impl RecallError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// True for the only fatal class, raised before any indexing or recall.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
