use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error types for Harvest.
#[derive(Error, Debug)]
pub enum AppError {
    /// Connection, DNS, TLS or body-read failure while fetching a page.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The target answered with a non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// The page loaded but the expected structured content is absent.
    #[error("Missing structured data: {0}")]
    MissingStructuredData(String),

    /// Structured content was found but could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading or rewriting the shared append store failed.
    #[error("Shared store I/O error: {0}")]
    StoreIo(String),

    /// The shared store lock could not be acquired in time.
    #[error("Timed out after {0:?} waiting for the shared store lock")]
    LockTimeout(std::time::Duration),

    /// A worker shard expected by the aggregator is absent.
    #[error("Missing shard: {0}")]
    ShardMissing(String),

    /// A worker shard exists but is not a well-formed array.
    #[error("Corrupt shard {path}: {message}")]
    ShardCorrupt { path: String, message: String },

    /// Invalid run configuration (zero pool size, zero workers, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Classify this error into the run-wide taxonomy used in error logs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Transport(_) | AppError::Timeout(_) => ErrorKind::TransportError,
            AppError::HttpStatus { .. } => ErrorKind::HttpStatusError,
            AppError::MissingStructuredData(_) => ErrorKind::MissingStructuredData,
            AppError::Decode(_) | AppError::Serialization(_) => ErrorKind::DecodeError,
            AppError::StoreIo(_) | AppError::LockTimeout(_) => ErrorKind::SharedStoreIoError,
            AppError::Io(_)
            | AppError::ShardMissing(_)
            | AppError::ShardCorrupt { .. }
            | AppError::InvalidConfig(_)
            | AppError::Generic(_) => ErrorKind::UnexpectedError,
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AppError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Classified failure kind, serialized as `error_type` in the error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportError,
    HttpStatusError,
    MissingStructuredData,
    DecodeError,
    SharedStoreIoError,
    UnexpectedError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransportError => "transport_error",
            ErrorKind::HttpStatusError => "http_status_error",
            ErrorKind::MissingStructuredData => "missing_structured_data",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::SharedStoreIoError => "shared_store_io_error",
            ErrorKind::UnexpectedError => "unexpected_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
