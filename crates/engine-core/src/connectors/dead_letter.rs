use crate::error::DeadLetterError;
use async_trait::async_trait;
use model::execution::dead_letter::DeadLetterEntry;
use std::path::Path;
use tracing::debug;

/// Durable destination for terminal failures. `emit` returning `Ok` means the
/// entry survives a crash; the pipeline hands over ownership at that point.
#[async_trait]
pub trait DeadLetterChannel: Send + Sync {
    async fn emit(&self, entry: &DeadLetterEntry) -> Result<(), DeadLetterError>;

    async fn list(&self) -> Result<Vec<DeadLetterEntry>, DeadLetterError>;
}

/// Dead-letter channel backed by an embedded sled tree. Entries are keyed by
/// dead-letter time so `list` returns them oldest first.
pub struct SledDeadLetterChannel {
    db: sled::Db,
}

impl SledDeadLetterChannel {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeadLetterError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    #[inline]
    fn entry_key(entry: &DeadLetterEntry) -> String {
        let nanos = entry.dead_lettered_at.timestamp_nanos_opt().unwrap_or(0);
        format!("dlq:{:020}:{}", nanos, entry.id)
    }
}

#[async_trait]
impl DeadLetterChannel for SledDeadLetterChannel {
    async fn emit(&self, entry: &DeadLetterEntry) -> Result<(), DeadLetterError> {
        let key = Self::entry_key(entry);
        let value = serde_json::to_vec(entry)?;

        self.db.insert(key, value)?;
        self.db.flush_async().await?;

        debug!(entry_id = %entry.id, kind = %entry.kind, records = entry.record_count(), "Dead-lettered");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeadLetterEntry>, DeadLetterError> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix("dlq:") {
            let (_key, value) = item?;
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use model::{
        execution::{
            dead_letter::{AttemptRecord, DeadLetterPayload},
            failure::{Failure, FailureKind},
        },
        records::raw::RawRecord,
    };
    use tempfile::tempdir;

    fn entry(payload: &str, at: chrono::DateTime<Utc>) -> DeadLetterEntry {
        let failure = Failure::new(FailureKind::MalformedPayload, "not json");
        DeadLetterEntry::new(
            &failure,
            DeadLetterPayload::Record(RawRecord::new(payload, "p0", at)),
            vec![AttemptRecord::from_failure(1, &failure, at)],
            at,
        )
    }

    #[tokio::test]
    async fn entries_survive_reopen_in_order() {
        let dir = tempdir().unwrap();
        let now = Utc::now();
        let first = entry("{bad", now);
        let second = entry("{worse", now + Duration::seconds(1));

        {
            let channel = SledDeadLetterChannel::open(dir.path()).unwrap();
            channel.emit(&second).await.unwrap();
            channel.emit(&first).await.unwrap();
        }

        let channel = SledDeadLetterChannel::open(dir.path()).unwrap();
        let listed = channel.list().await.unwrap();
        assert_eq!(listed, vec![first, second]);
    }
}
