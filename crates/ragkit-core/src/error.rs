use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Rerank failed ({reranker}): {message}")]
    RerankFailure { reranker: String, message: String },

    #[error("Partial failure on {path} path: {message}")]
    PartialFailure { path: String, message: String },

    #[error("Timed out after {elapsed_ms} ms during {stage}")]
    Timeout { stage: String, elapsed_ms: u64 },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error category exposed to callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    BackendUnavailable,
    DimensionMismatch,
    UnsupportedFilter,
    InvalidQuery,
    RerankFailure,
    PartialFailure,
    Timeout,
    Embedding,
    NotFound,
    Operation,
}

impl Error {
    pub fn backend(backend: impl Into<String>, message: impl ToString) -> Self {
        Self::BackendUnavailable { backend: backend.into(), message: message.to_string() }
    }

    pub fn rerank(reranker: impl Into<String>, message: impl ToString) -> Self {
        Self::RerankFailure { reranker: reranker.into(), message: message.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::UnsupportedFilter(_) => ErrorKind::UnsupportedFilter,
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::RerankFailure { .. } => ErrorKind::RerankFailure,
            Self::PartialFailure { .. } => ErrorKind::PartialFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Embedding(_) => ErrorKind::Embedding,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Operation(_) => ErrorKind::Operation,
        }
    }

    /// Transient failures worth another attempt. Caller errors never are.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. } | Self::Timeout { .. })
    }
}

/// Structured error object handed to the upstream API layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self { kind: err.kind(), message: err.to_string() }
    }
}

impl From<Error> for ErrorBody {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}
