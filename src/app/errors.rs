use crate::backend::BackendError;
use crate::embedding::EmbeddingError;
use crate::search::ValidationError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Request body or query string could not be parsed.
    #[error("{0}")]
    BadRequestBody(String),

    #[error("Invalid or missing API key")]
    Unauthorized,

    /// A required component is not initialized. The message names what is
    /// missing.
    #[error("{0}")]
    NotReady(String),

    #[error("{0}")]
    Embedding(#[from] EmbeddingError),

    /// Detail is logged, clients get a generic message.
    #[error("Search backend request failed")]
    Backend(#[from] BackendError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
