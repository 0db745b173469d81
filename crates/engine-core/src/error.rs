use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read from ingestion source '{source_key}': {source}")]
    Read {
        source_key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Ingestion source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage did not acknowledge within {0:?}")]
    Timeout(Duration),

    #[error("Storage temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid destination path: {0}")]
    InvalidDestination(String),

    #[error("Permission denied writing to {0}")]
    PermissionDenied(String),

    #[error("Storage quota exceeded writing to {0}")]
    QuotaExceeded(String),
}

#[derive(Error, Debug)]
pub enum DeadLetterError {
    #[error("Dead-letter store error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Failed to serialize dead-letter entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dead-letter channel unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Lookup for '{key}' unavailable: {reason}")]
    Unavailable { key: String, reason: String },

    #[error("Lookup for '{0}' timed out after {1:?}")]
    Timeout(String, Duration),
}
