use engine_core::{
    connectors::source::{IngestSource, SourcePoll},
    error::SourceError,
};
use engine_processing::{transform::Transformer, validation::EventValidator};
use model::execution::failure::Failure;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Outcome of a dry validation and transformation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub valid: u64,
    pub invalid: u64,
    /// First error message seen for every failure kind.
    pub first_errors: BTreeMap<String, String>,
}

impl CheckReport {
    fn reject(&mut self, failure: Failure) {
        self.invalid += 1;
        self.first_errors
            .entry(failure.kind.to_string())
            .or_insert(failure.message);
    }
}

/// Validates and transforms every record the source yields without writing
/// anything. Stops at the first idle poll.
pub async fn run_check(
    source: &dyn IngestSource,
    validator: &EventValidator,
    transformer: &Transformer,
) -> Result<CheckReport, SourceError> {
    let mut report = CheckReport::default();

    while let SourcePoll::Ready(raw) = source.poll().await? {
        let event = match validator.validate(&raw) {
            Ok(event) => event,
            Err(e) => {
                debug!(source_key = %raw.source_key, error = %e, "Invalid record");
                report.reject(e.into());
                continue;
            }
        };

        match transformer.transform(&event).await {
            Ok(_) => report.valid += 1,
            Err(e) => {
                debug!(event_id = %event.event_id, error = %e, "Transform failed");
                report.reject(e.into());
            }
        }
    }

    info!(valid = report.valid, invalid = report.invalid, "Check finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::VecSource;
    use chrono::Utc;
    use engine_config::settings::{SkewBounds, TransformSettings};
    use engine_core::{clock::ManualClock, connectors::lookup::StaticRateTable};
    use std::sync::Arc;

    #[tokio::test]
    async fn counts_valid_and_invalid_records() {
        let now = Utc::now();
        let ts = now.to_rfc3339();
        let source = VecSource::new(vec![
            format!(r#"{{"id":"e1","type":"page_view","ts":"{ts}","user_id":"u1"}}"#),
            format!(r#"{{"type":"page_view","ts":"{ts}","user_id":"u1"}}"#),
            format!(r#"{{"type":"search","ts":"{ts}","user_id":"u2"}}"#),
            "not json".to_string(),
        ]);
        let validator = EventValidator::new(SkewBounds::default(), Arc::new(ManualClock::new(now)));

        let transformer = Transformer::new(
            &TransformSettings::default(),
            Arc::new(StaticRateTable::usd_defaults()),
        );

        let report = run_check(&source, &validator, &transformer).await.unwrap();

        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 3);
        assert_eq!(report.first_errors.len(), 2);
        assert!(report.first_errors.contains_key("SchemaViolation{field:id}"));
        assert!(report.first_errors.contains_key("MalformedPayload"));
    }
}
