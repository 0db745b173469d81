use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage at which a failure was observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    Transform,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validate => write!(f, "Validate"),
            Stage::Transform => write!(f, "Transform"),
            Stage::Write => write!(f, "Write"),
        }
    }
}

/// Classification of every stage-local failure. The failure router decides
/// retry versus dead-letter from this value alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureKind {
    MalformedPayload,
    SchemaViolation { field: String },
    TimestampOutOfRange,
    EnrichmentFailure { step: String },
    WriteError { retryable: bool },
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureKind::MalformedPayload
            | FailureKind::SchemaViolation { .. }
            | FailureKind::TimestampOutOfRange => false,
            FailureKind::EnrichmentFailure { .. } => true,
            FailureKind::WriteError { retryable } => *retryable,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            FailureKind::MalformedPayload
            | FailureKind::SchemaViolation { .. }
            | FailureKind::TimestampOutOfRange => Stage::Validate,
            FailureKind::EnrichmentFailure { .. } => Stage::Transform,
            FailureKind::WriteError { .. } => Stage::Write,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::MalformedPayload => write!(f, "MalformedPayload"),
            FailureKind::SchemaViolation { field } => write!(f, "SchemaViolation{{field:{field}}}"),
            FailureKind::TimestampOutOfRange => write!(f, "TimestampOutOfRange"),
            FailureKind::EnrichmentFailure { step } => write!(f, "EnrichmentFailure{{step:{step}}}"),
            FailureKind::WriteError { retryable } => {
                write!(f, "WriteError{{retryable:{retryable}}}")
            }
        }
    }
}

/// A stage failure flowing into the failure router.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Failure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage: kind.stage(),
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failures_are_terminal() {
        let kinds = [
            FailureKind::MalformedPayload,
            FailureKind::SchemaViolation { field: "id".into() },
            FailureKind::TimestampOutOfRange,
        ];
        for kind in kinds {
            assert!(!kind.is_retryable());
            assert_eq!(kind.stage(), Stage::Validate);
        }
    }

    #[test]
    fn write_retryability_follows_flag() {
        assert!(FailureKind::WriteError { retryable: true }.is_retryable());
        assert!(!FailureKind::WriteError { retryable: false }.is_retryable());
        assert!(FailureKind::EnrichmentFailure { step: "currency".into() }.is_retryable());
    }

    #[test]
    fn display_names_the_field() {
        let f = Failure::new(FailureKind::SchemaViolation { field: "id".into() }, "missing");
        assert_eq!(f.to_string(), "[Validate] SchemaViolation{field:id}: missing");
    }
}
