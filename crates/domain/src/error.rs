/// Shared error type used across the scheduling core.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store: {0}")]
    Store(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("stage {stage} failed: {message}")]
    StageFailed {
        stage: String,
        message: String,
        retryable: bool,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for a stage failure a caller should retry; false for a
    /// permanent failure (bad input, auth, anything retrying won't fix).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StageFailed { retryable, .. } if *retryable)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
