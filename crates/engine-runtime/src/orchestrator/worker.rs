use crate::{
    error::PipelineError,
    fatal::FatalLatch,
    orchestrator::{dead_letters::DeadLetterRelay, shards::ShardRouter},
};
use engine_core::{
    clock::Clock,
    connectors::source::{IngestSource, SourcePoll},
    metrics::Metrics,
};
use engine_processing::{
    router::{FailureRouter, RouteDecision},
    transform::Transformer,
    validation::EventValidator,
};
use model::{
    events::{EnrichedEvent, ValidatedEvent},
    execution::{dead_letter::AttemptRecord, failure::Failure},
    records::raw::RawRecord,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One ingestion worker: pull, validate, transform, hand to the owning shard.
pub struct Worker {
    pub id: usize,
    pub source: Arc<dyn IngestSource>,
    pub validator: Arc<EventValidator>,
    pub transformer: Arc<Transformer>,
    pub router: FailureRouter,
    pub shards: ShardRouter,
    pub dead_letters: DeadLetterRelay,
    pub metrics: Metrics,
    pub clock: Arc<dyn Clock>,
    pub fatal: FatalLatch,
    pub cancel: CancellationToken,
    pub poll_interval: Duration,
}

impl Worker {
    /// Runs until the source finishes or the token is cancelled. A pending
    /// poll is abandoned on cancellation; a record already pulled is always
    /// carried to a terminal or handed-off state.
    pub async fn run(self) -> Result<(), PipelineError> {
        debug!(worker = self.id, "Worker started");

        loop {
            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(worker = self.id, "Worker stopping on shutdown");
                    break;
                }
                polled = self.source.poll() => polled,
            };

            match polled {
                Ok(SourcePoll::Ready(raw)) => {
                    self.metrics.increment_received(1);
                    self.process(raw).await?;
                }
                Ok(SourcePoll::Idle) => self.idle().await,
                Ok(SourcePoll::Finished) => {
                    debug!(worker = self.id, "Source finished");
                    break;
                }
                Err(e) => {
                    warn!(worker = self.id, error = %e, "Source poll failed");
                    self.idle().await;
                }
            }
        }

        Ok(())
    }

    async fn idle(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.poll_interval) => {}
        }
    }

    /// Sleeps for `delay`. Returns true when cancellation ended the wait early.
    async fn backoff(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(worker = self.id, "Backoff interrupted by shutdown");
                true
            }
            _ = tokio::time::sleep(delay) => false,
        }
    }

    async fn process(&self, raw: RawRecord) -> Result<(), PipelineError> {
        let event = match self.validator.validate(&raw) {
            Ok(event) => event,
            Err(e) => {
                let failure = Failure::from(e);
                self.metrics.increment_failures(1);
                debug!(worker = self.id, source_key = %raw.source_key, error = %failure, "Rejected record");
                let history = vec![AttemptRecord::from_failure(raw.attempt, &failure, self.clock.now())];
                // Validation failures are terminal.
                return self.dead_letters.record(raw, &failure, history).await;
            }
        };

        let Some(enriched) = self.enrich(&raw, &event).await? else {
            return Ok(());
        };

        let event_id = enriched.event_id.clone();
        if let Err(e) = self.shards.admit(enriched).await {
            error!(worker = self.id, event_id = %event_id, error = %e, "Window shard unavailable");
            self.fatal
                .trip(format!("window shard unavailable for event {event_id}: {e}"));
            return Err(PipelineError::Actor(e));
        }
        Ok(())
    }

    /// Transforms with inline backoff. Returns `None` once the record has
    /// been dead-lettered.
    ///
    /// Cancellation cuts a backoff short. The record then gets one last
    /// attempt and is dead-lettered if that fails too.
    async fn enrich(
        &self,
        raw: &RawRecord,
        event: &ValidatedEvent,
    ) -> Result<Option<EnrichedEvent>, PipelineError> {
        let mut attempt = raw.attempt;
        let mut history = Vec::new();
        let mut last_attempt = false;

        loop {
            let failure = match self.transformer.transform(event).await {
                Ok(enriched) => {
                    if !history.is_empty() {
                        self.metrics.leave_retrying(1);
                    }
                    return Ok(Some(enriched));
                }
                Err(e) => Failure::from(e),
            };

            self.metrics.increment_failures(1);
            history.push(AttemptRecord::from_failure(attempt, &failure, self.clock.now()));

            let decision = if last_attempt {
                RouteDecision::DeadLetter
            } else {
                self.router.route(&failure, attempt)
            };

            match decision {
                RouteDecision::Retry(delay) => {
                    if history.len() == 1 {
                        self.metrics.enter_retrying(1);
                    }
                    self.metrics.increment_retries(1);
                    warn!(
                        worker = self.id,
                        event_id = %event.event_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Transform failed, retrying"
                    );
                    last_attempt = self.backoff(delay).await;
                    attempt += 1;
                }
                RouteDecision::DeadLetter => {
                    if history.len() > 1 {
                        self.metrics.leave_retrying(1);
                    }
                    self.dead_letters
                        .record(raw.clone(), &failure, history)
                        .await?;
                    return Ok(None);
                }
            }
        }
    }
}
