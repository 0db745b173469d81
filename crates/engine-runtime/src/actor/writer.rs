use crate::{
    actor::{Actor, ActorContext, messages::WriterMsg},
    error::ActorError,
    orchestrator::dead_letters::DeadLetterRelay,
};
use async_trait::async_trait;
use engine_core::{clock::Clock, metrics::Metrics};
use engine_processing::{
    router::{FailureRouter, RouteDecision},
    sink::writer::SinkWriter,
    window::batch::Batch,
};
use model::execution::dead_letter::AttemptRecord;
use std::sync::Arc;
use tracing::{info, warn};

/// Writes one shard's closed batches strictly in hand-off order. A batch is
/// retried until it is written or dead-lettered before the next one starts.
pub struct WriterActor {
    writer: SinkWriter,
    router: FailureRouter,
    dead_letters: DeadLetterRelay,
    metrics: Metrics,
    clock: Arc<dyn Clock>,
}

impl WriterActor {
    pub fn new(
        writer: SinkWriter,
        router: FailureRouter,
        dead_letters: DeadLetterRelay,
        metrics: Metrics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            writer,
            router,
            dead_letters,
            metrics,
            clock,
        }
    }

    async fn persist(&self, batch: Batch) -> Result<(), ActorError> {
        let records = batch.record_count() as u64;
        let mut history = Vec::new();
        let mut attempt = 1;

        loop {
            let failure = match self.writer.write(&batch).await {
                Ok(result) => {
                    self.metrics
                        .record_batch_written(records, result.bytes_written as u64);
                    if attempt > 1 {
                        self.metrics.leave_retrying(records);
                    }
                    return Ok(());
                }
                Err(failure) => failure,
            };

            self.metrics.increment_failures(1);
            history.push(AttemptRecord::from_failure(attempt, &failure, self.clock.now()));

            match self.router.route(&failure, attempt) {
                RouteDecision::Retry(delay) => {
                    warn!(
                        batch_id = %batch.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Batch write failed, retrying"
                    );
                    if attempt == 1 {
                        self.metrics.enter_retrying(records);
                    }
                    self.metrics.increment_retries(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RouteDecision::DeadLetter => {
                    if attempt > 1 {
                        self.metrics.leave_retrying(records);
                    }
                    let batch_id = batch.id();
                    return self
                        .dead_letters
                        .batch(batch, &failure, history)
                        .await
                        .map_err(|e| ActorError::Halted(format!("batch {batch_id}: {e}")));
                }
            }
        }
    }
}

#[async_trait]
impl Actor<WriterMsg> for WriterActor {
    async fn handle(&mut self, msg: WriterMsg, _ctx: &ActorContext) -> Result<(), ActorError> {
        match msg {
            WriterMsg::Write(batch) => self.persist(batch).await,
        }
    }

    async fn on_stop(&mut self, ctx: &ActorContext) -> Result<(), ActorError> {
        info!(actor = ctx.name(), "Writer stopped");
        Ok(())
    }
}
