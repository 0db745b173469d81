use crate::{error::PipelineError, fatal::FatalLatch};
use engine_core::{clock::Clock, connectors::dead_letter::DeadLetterChannel, metrics::Metrics};
use engine_processing::{sink::writer::object_path, window::batch::Batch};
use model::{
    execution::{
        dead_letter::{AttemptRecord, DeadLetterEntry, DeadLetterPayload},
        failure::Failure,
    },
    records::raw::RawRecord,
};
use std::sync::Arc;
use tracing::warn;

/// Hands terminal failures to the dead-letter channel. A failed emission
/// trips the fatal latch.
#[derive(Clone)]
pub struct DeadLetterRelay {
    channel: Arc<dyn DeadLetterChannel>,
    metrics: Metrics,
    fatal: FatalLatch,
    clock: Arc<dyn Clock>,
}

impl DeadLetterRelay {
    pub fn new(
        channel: Arc<dyn DeadLetterChannel>,
        metrics: Metrics,
        fatal: FatalLatch,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            channel,
            metrics,
            fatal,
            clock,
        }
    }

    pub async fn record(
        &self,
        raw: RawRecord,
        failure: &Failure,
        history: Vec<AttemptRecord>,
    ) -> Result<(), PipelineError> {
        let entry = DeadLetterEntry::new(
            failure,
            DeadLetterPayload::Record(raw),
            history,
            self.clock.now(),
        );
        self.emit(entry).await
    }

    pub async fn batch(
        &self,
        batch: Batch,
        failure: &Failure,
        history: Vec<AttemptRecord>,
    ) -> Result<(), PipelineError> {
        let payload = DeadLetterPayload::Batch {
            partition_key: batch.partition_key().clone(),
            close_seq: batch.close_seq().unwrap_or_default(),
            location: object_path(&batch).unwrap_or_default(),
            events: batch.into_events(),
        };
        let entry = DeadLetterEntry::new(failure, payload, history, self.clock.now());
        self.emit(entry).await
    }

    async fn emit(&self, entry: DeadLetterEntry) -> Result<(), PipelineError> {
        match self.channel.emit(&entry).await {
            Ok(()) => {
                self.metrics.record_dead_letter(entry.record_count() as u64);
                warn!(
                    entry_id = %entry.id,
                    stage = %entry.stage,
                    kind = %entry.kind,
                    attempts = entry.attempts(),
                    records = entry.record_count(),
                    "Dead-lettered"
                );
                Ok(())
            }
            Err(e) => {
                self.fatal.trip(format!(
                    "could not dead-letter {} ({} records): {e}",
                    entry.id,
                    entry.record_count()
                ));
                Err(PipelineError::DeadLetter(e))
            }
        }
    }
}
