//! Error taxonomy shared by the batch and online scoring paths.

use thiserror::Error;

/// Failure raised while loading inputs, resolving a model or scoring a table.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScoringError {
    /// A dataset, model or model file could not be found
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one model artifact where exactly one is expected
    #[error("ambiguous model: {0}")]
    AmbiguousModel(String),

    /// Unexpected or missing columns, or cells of the wrong type
    #[error("schema error: {0}")]
    Schema(String),

    /// Request body is not valid JSON or lacks the `data` key
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Remote model registry failure
    #[error("registry error: {0}")]
    Registry(String),

    /// Filesystem or network I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoringError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn ambiguous_model(msg: impl Into<String>) -> Self {
        Self::AmbiguousModel(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Stable classification label, used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AmbiguousModel(_) => "ambiguous_model",
            Self::Schema(_) => "schema",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Registry(_) => "registry",
            Self::Io(_) => "io",
        }
    }
}

impl From<csv::Error> for ScoringError {
    fn from(err: csv::Error) -> Self {
        if !err.is_io_error() {
            return Self::Schema(err.to_string());
        }
        match err.into_kind() {
            csv::ErrorKind::Io(io) => Self::Io(io),
            other => Self::Schema(format!("{other:?}")),
        }
    }
}

pub type ScoringResult<T> = Result<T, ScoringError>;
