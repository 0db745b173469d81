use crate::{
    core::identifiers::PartitionKey,
    events::EnrichedEvent,
    execution::failure::{Failure, FailureKind, Stage},
    records::raw::RawRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A terminal failure handed to the dead-letter channel. Once emitted the
/// pipeline no longer owns the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterEntry {
    pub id: String,
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
    pub payload: DeadLetterPayload,
    /// One entry per failed attempt, oldest first.
    pub history: Vec<AttemptRecord>,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DeadLetterPayload {
    /// A single raw record rejected before windowing.
    Record(RawRecord),
    /// A closed batch the sink could not persist.
    Batch {
        partition_key: PartitionKey,
        close_seq: u64,
        location: String,
        events: Vec<EnrichedEvent>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn from_failure(attempt: u32, failure: &Failure, at: DateTime<Utc>) -> Self {
        Self {
            attempt,
            kind: failure.kind.clone(),
            message: failure.message.clone(),
            at,
        }
    }
}

impl DeadLetterEntry {
    pub fn new(
        failure: &Failure,
        payload: DeadLetterPayload,
        history: Vec<AttemptRecord>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            stage: failure.stage,
            kind: failure.kind.clone(),
            message: failure.message.clone(),
            payload,
            history,
            dead_lettered_at: at,
        }
    }

    /// Number of source records this entry accounts for.
    pub fn record_count(&self) -> usize {
        match &self.payload {
            DeadLetterPayload::Record(_) => 1,
            DeadLetterPayload::Batch { events, .. } => events.len(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.history.last().map(|a| a.attempt).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_entry_counts_one() {
        let now = Utc::now();
        let failure = Failure::new(FailureKind::MalformedPayload, "expected value at line 1");
        let raw = RawRecord::new("{oops", "part-0", now);
        let entry = DeadLetterEntry::new(
            &failure,
            DeadLetterPayload::Record(raw),
            vec![AttemptRecord::from_failure(1, &failure, now)],
            now,
        );

        assert_eq!(entry.record_count(), 1);
        assert_eq!(entry.attempts(), 1);
        assert_eq!(entry.stage, Stage::Validate);
        assert!(!entry.id.is_empty());
    }

    #[test]
    fn entries_serialize_to_json() {
        let now = Utc::now();
        let failure = Failure::new(FailureKind::WriteError { retryable: true }, "timed out");
        let entry = DeadLetterEntry::new(
            &failure,
            DeadLetterPayload::Batch {
                partition_key: PartitionKey::new("year=2026/month=10/day=16"),
                close_seq: 3,
                location: "year=2026/month=10/day=16/part-1-000003.jsonl".into(),
                events: vec![],
            },
            vec![],
            now,
        );

        let bytes = serde_json::to_vec(&entry).unwrap();
        let back: DeadLetterEntry = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, entry);
        assert_eq!(back.record_count(), 0);
    }
}
