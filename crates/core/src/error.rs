//! Error types for CycleCare.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! embedding, generation, index storage, ingestion, retrieval and prompt
//! failures. External service errors carry a [`ServiceFailure`] kind so that
//! callers can decide on retries without inspecting message text.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for CycleCare.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// Library code never panics; errors are represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or inconsistent configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller supplied an argument outside the accepted domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Embedding service failures
    #[error("Embedding error ({kind}): {message}")]
    Embedding { kind: ServiceFailure, message: String },

    /// Generation service failures
    #[error("Generation error ({kind}): {message}")]
    Generation { kind: ServiceFailure, message: String },

    /// An external call did not finish in time
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Vector index storage errors
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Document loading or chunking failed during ingestion
    #[error("Ingest error: {0}")]
    Ingest(String),

    /// Retrieval stage failed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Prompt template or assembly errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Operation requires a ready pipeline
    #[error("Pipeline not ready: {0}")]
    NotReady(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the persistent vector index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("no index found at {0:?}")]
    NotFound(PathBuf),

    #[error("index at {path:?} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("an index already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding scheme mismatch: index built with '{indexed}', embedder uses '{current}'")]
    SchemeMismatch { indexed: String, current: String },

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Classification of a failed call to an external model service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceFailure {
    /// Network error or the service could not be reached
    Unreachable,
    /// HTTP 429 or provider quota errors
    RateLimited,
    /// Missing or rejected credentials
    Unauthorized,
    /// The service refused the input (bad request, input too large, empty)
    Rejected,
    /// The response could not be understood
    Malformed,
}

impl ServiceFailure {
    /// Map an HTTP status code to a failure kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ServiceFailure::Unauthorized,
            429 => ServiceFailure::RateLimited,
            400..=499 => ServiceFailure::Rejected,
            _ => ServiceFailure::Unreachable,
        }
    }

    /// Whether one more attempt could plausibly succeed.
    pub fn is_transient(self) -> bool {
        matches!(self, ServiceFailure::Unreachable | ServiceFailure::RateLimited)
    }
}

impl std::fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ServiceFailure::Unreachable => "unreachable",
            ServiceFailure::RateLimited => "rate limited",
            ServiceFailure::Unauthorized => "unauthorized",
            ServiceFailure::Rejected => "rejected",
            ServiceFailure::Malformed => "malformed response",
        };
        f.write_str(label)
    }
}

impl AppError {
    pub fn embedding(kind: ServiceFailure, message: impl Into<String>) -> Self {
        AppError::Embedding {
            kind,
            message: message.into(),
        }
    }

    pub fn generation(kind: ServiceFailure, message: impl Into<String>) -> Self {
        AppError::Generation {
            kind,
            message: message.into(),
        }
    }

    /// Whether a retry of the failed operation may succeed.
    ///
    /// Timeouts and transient service failures qualify; everything else is
    /// permanent for the current request.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Timeout { .. } => true,
            AppError::Embedding { kind, .. } | AppError::Generation { kind, .. } => {
                kind.is_transient()
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServiceFailure::from_status(401), ServiceFailure::Unauthorized);
        assert_eq!(ServiceFailure::from_status(403), ServiceFailure::Unauthorized);
        assert_eq!(ServiceFailure::from_status(429), ServiceFailure::RateLimited);
        assert_eq!(ServiceFailure::from_status(413), ServiceFailure::Rejected);
        assert_eq!(ServiceFailure::from_status(503), ServiceFailure::Unreachable);
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::generation(ServiceFailure::RateLimited, "slow down").is_transient());
        assert!(AppError::Timeout {
            operation: "generate".into(),
            timeout_ms: 10
        }
        .is_transient());
        assert!(!AppError::generation(ServiceFailure::Unauthorized, "bad key").is_transient());
        assert!(!AppError::embedding(ServiceFailure::Rejected, "empty").is_transient());
        assert!(!AppError::NotReady("index".into()).is_transient());
    }

    #[test]
    fn test_index_error_converts() {
        let err: AppError = IndexError::DimensionMismatch {
            expected: 384,
            actual: 3,
        }
        .into();
        assert!(matches!(
            err,
            AppError::Index(IndexError::DimensionMismatch { .. })
        ));
        assert!(err.to_string().contains("384"));
    }
}
