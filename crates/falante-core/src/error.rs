//! Engine error taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine and its collaborators.
///
/// `InvalidInput` and `SessionNotFound` are client-caused and are raised
/// before any model call; `PrepareFailed` and `GenerationFailed` carry the
/// underlying cause from the model backend.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown voice session: {0}")]
    SessionNotFound(String),

    #[error("voice conditioning failed: {0}")]
    PrepareFailed(String),

    #[error("speech generation failed: {0}")]
    GenerationFailed(String),
}
