use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A payload exactly as delivered by the ingestion source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub payload: String,
    /// Source partition (shard, file, queue) the record was read from.
    pub source_key: String,
    pub arrival: DateTime<Utc>,
    /// Delivery attempt reported by the source, starting at 1.
    pub attempt: u32,
}

impl RawRecord {
    pub fn new(
        payload: impl Into<String>,
        source_key: impl Into<String>,
        arrival: DateTime<Utc>,
    ) -> Self {
        Self {
            payload: payload.into(),
            source_key: source_key.into(),
            arrival,
            attempt: 1,
        }
    }

    /// Marks a redelivery by the source.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt.max(1);
        self
    }
}
