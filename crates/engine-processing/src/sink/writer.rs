use crate::{retry::sink_failure, window::batch::Batch};
use engine_core::{connectors::sink::StorageSink, error::SinkError};
use model::execution::failure::{Failure, FailureKind};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    pub location: String,
    pub records_written: usize,
    pub bytes_written: usize,
    pub duration: Duration,
}

/// Deterministic object path of a closed batch. Writing the same batch again
/// targets the same object.
pub fn object_path(batch: &Batch) -> Option<String> {
    let closed_at = batch.closed_at()?;
    let seq = batch.close_seq()?;
    Some(format!(
        "{}/part-{}-{:06}.jsonl",
        batch.partition_key(),
        closed_at.timestamp_millis(),
        seq
    ))
}

/// Newline-delimited JSON, one row per event.
pub fn encode_batch(batch: &Batch) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::with_capacity(batch.size_bytes());
    for event in batch.events() {
        serde_json::to_writer(&mut buf, &event.to_row())?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Persists closed batches through a [`StorageSink`].
#[derive(Clone)]
pub struct SinkWriter {
    sink: Arc<dyn StorageSink>,
    write_timeout: Duration,
}

impl SinkWriter {
    pub fn new(sink: Arc<dyn StorageSink>, write_timeout: Duration) -> Self {
        Self {
            sink,
            write_timeout,
        }
    }

    /// Writes one closed batch. `Ok` means the storage acknowledged the
    /// object as durable.
    pub async fn write(&self, batch: &Batch) -> Result<WriteResult, Failure> {
        let start = Instant::now();

        let Some(location) = object_path(batch) else {
            return Err(Failure::new(
                FailureKind::WriteError { retryable: false },
                format!("batch {} is not closed", batch.id()),
            ));
        };

        let bytes = encode_batch(batch).map_err(|e| {
            Failure::new(
                FailureKind::WriteError { retryable: false },
                format!("{location}: failed to encode batch: {e}"),
            )
        })?;

        match tokio::time::timeout(self.write_timeout, self.sink.put(&location, &bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(sink_failure(&e, &location)),
            Err(_) => {
                return Err(sink_failure(
                    &SinkError::Timeout(self.write_timeout),
                    &location,
                ));
            }
        }

        let duration = start.elapsed();
        info!(
            batch_id = %batch.id(),
            location = %location,
            records = batch.record_count(),
            bytes = bytes.len(),
            duration_ms = duration.as_millis() as u64,
            "Batch written"
        );

        Ok(WriteResult {
            location,
            records_written: batch.record_count(),
            bytes_written: bytes.len(),
            duration,
        })
    }
}
