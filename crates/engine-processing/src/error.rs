use chrono::{DateTime, Utc};
use model::execution::failure::{Failure, FailureKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Schema violation on '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },

    #[error("Timestamp {ts} outside accepted window [{earliest}, {latest}]")]
    TimestampOutOfRange {
        ts: DateTime<Utc>,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

impl ValidationError {
    pub fn schema(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::SchemaViolation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ValidationError::MalformedPayload(_) => FailureKind::MalformedPayload,
            ValidationError::SchemaViolation { field, .. } => FailureKind::SchemaViolation {
                field: field.clone(),
            },
            ValidationError::TimestampOutOfRange { .. } => FailureKind::TimestampOutOfRange,
        }
    }
}

impl From<ValidationError> for Failure {
    fn from(err: ValidationError) -> Self {
        Failure::new(err.kind(), err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("Enrichment step '{step}' failed: {reason}")]
    Enrichment { step: &'static str, reason: String },
}

impl TransformError {
    pub fn step(&self) -> &'static str {
        match self {
            TransformError::Enrichment { step, .. } => step,
        }
    }
}

impl From<TransformError> for Failure {
    fn from(err: TransformError) -> Self {
        Failure::new(
            FailureKind::EnrichmentFailure {
                step: err.step().to_string(),
            },
            err.to_string(),
        )
    }
}
