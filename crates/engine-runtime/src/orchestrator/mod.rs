use crate::{
    error::PipelineError,
    fatal::FatalLatch,
    orchestrator::{
        dead_letters::DeadLetterRelay,
        shards::{ShardRouter, spawn_shards},
        worker::Worker,
    },
    summary::{PipelineSummary, RunOutcome},
};
use engine_config::settings::PipelineSettings;
use engine_core::{
    clock::Clock,
    connectors::{
        dead_letter::DeadLetterChannel, lookup::RateLookup, sink::StorageSink,
        source::IngestSource,
    },
    metrics::Metrics,
};
use engine_processing::{router::FailureRouter, transform::Transformer, validation::EventValidator};
use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::{AbortHandle, JoinHandle},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod dead_letters;
pub mod shards;
pub mod worker;

/// External systems the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn IngestSource>,
    pub sink: Arc<dyn StorageSink>,
    pub dead_letters: Arc<dyn DeadLetterChannel>,
    pub rates: Arc<dyn RateLookup>,
    pub clock: Arc<dyn Clock>,
}

/// Owns every piece of state of a single pipeline run.
pub struct Orchestrator {
    settings: PipelineSettings,
    collaborators: Collaborators,
    shutdown: CancellationToken,
    metrics: Metrics,
}

impl Orchestrator {
    /// `shutdown` is the external stop signal; cancelling it starts a drain.
    pub fn new(
        settings: PipelineSettings,
        collaborators: Collaborators,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            collaborators,
            shutdown,
            metrics: Metrics::new(),
        }
    }

    /// Live view of the run's counters.
    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }

    /// Runs until the source is exhausted or shutdown is requested, then
    /// drains. Fails with [`PipelineError::Fatal`] when a terminal failure
    /// could not be dead-lettered or the drain did not finish in time.
    pub async fn run(self) -> Result<PipelineSummary, PipelineError> {
        let started = std::time::Instant::now();
        let Orchestrator {
            settings,
            collaborators,
            shutdown,
            metrics,
        } = self;
        let runtime = &settings.runtime;

        let cancel = shutdown.child_token();
        let fatal = FatalLatch::new(cancel.clone());
        let relay = DeadLetterRelay::new(
            collaborators.dead_letters.clone(),
            metrics.clone(),
            fatal.clone(),
            collaborators.clock.clone(),
        );

        let shards = spawn_shards(
            &settings,
            collaborators.sink.clone(),
            relay.clone(),
            metrics.clone(),
            collaborators.clock.clone(),
        );
        let ticker_stop = CancellationToken::new();
        let ticker = spawn_ticker(
            shards.router.clone(),
            runtime.tick_interval,
            ticker_stop.clone(),
        );

        let validator = Arc::new(EventValidator::new(
            settings.skew,
            collaborators.clock.clone(),
        ));
        let transformer = Arc::new(Transformer::new(
            &settings.transform,
            collaborators.rates.clone(),
        ));

        info!(
            workers = runtime.workers,
            shards = shards.router.len(),
            partition_rule = %settings.transform.partition_rule,
            steps = ?transformer.step_names(),
            "Starting pipeline"
        );

        let workers: Vec<JoinHandle<Result<(), PipelineError>>> = (0..runtime.workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    source: collaborators.source.clone(),
                    validator: validator.clone(),
                    transformer: transformer.clone(),
                    router: FailureRouter::new(settings.retry.clone()),
                    shards: shards.router.clone(),
                    dead_letters: relay.clone(),
                    metrics: metrics.clone(),
                    clock: collaborators.clock.clone(),
                    fatal: fatal.clone(),
                    cancel: cancel.clone(),
                    poll_interval: runtime.poll_interval,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let deadline = await_workers(workers, &cancel, &fatal, runtime.drain_timeout).await;

        // Drain: close every open batch, flush it through the writers and
        // wait for all actors to stop.
        ticker_stop.cancel();
        if let Err(e) = ticker.await {
            warn!(error = %e, "Ticker task failed");
        }

        let router = shards.router;
        if tokio::time::timeout_at(deadline, router.drain()).await.is_err() {
            fatal.trip("window shards did not accept the drain request in time");
        }
        drop(router);

        let actor_aborts: Vec<AbortHandle> = shards
            .windows
            .iter()
            .chain(shards.writers.iter())
            .map(JoinHandle::abort_handle)
            .collect();
        let actors = async {
            join_actors("window", shards.windows).await;
            join_actors("writer", shards.writers).await;
        };
        if tokio::time::timeout_at(deadline, actors).await.is_err() {
            actor_aborts.iter().for_each(AbortHandle::abort);
            fatal.trip(format!(
                "drain did not complete within {}ms",
                runtime.drain_timeout.as_millis()
            ));
        }

        let elapsed = started.elapsed();
        if let Some(reason) = fatal.reason() {
            let summary = PipelineSummary::from_snapshot(
                metrics.snapshot(),
                elapsed,
                RunOutcome::Fatal {
                    reason: reason.to_string(),
                },
            );
            error!(
                reason,
                received = summary.records_received,
                written = summary.records_written,
                dead_lettered = summary.records_dead_lettered,
                in_flight = summary.in_flight,
                "Pipeline halted"
            );
            return Err(PipelineError::Fatal {
                reason: reason.to_string(),
                summary: Box::new(summary),
            });
        }

        let outcome = if shutdown.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        };
        let summary = PipelineSummary::from_snapshot(metrics.snapshot(), elapsed, outcome);
        info!(
            outcome = %summary.outcome,
            received = summary.records_received,
            written = summary.records_written,
            batches = summary.batches_written,
            dead_lettered = summary.records_dead_lettered,
            retries = summary.retries,
            elapsed_ms = summary.elapsed_ms,
            "Pipeline finished"
        );
        Ok(summary)
    }
}

/// Waits for the workers to stop and returns the drain deadline.
///
/// The deadline starts when cancellation is observed, or when the last worker
/// exits on its own. Workers still running at the deadline are aborted, and
/// the drain of the shards shares what is left of it.
async fn await_workers(
    workers: Vec<JoinHandle<Result<(), PipelineError>>>,
    cancel: &CancellationToken,
    fatal: &FatalLatch,
    drain_timeout: Duration,
) -> Instant {
    let aborts: Vec<AbortHandle> = workers.iter().map(JoinHandle::abort_handle).collect();
    let all = join_all(workers);
    tokio::pin!(all);

    let finished = tokio::select! {
        results = &mut all => Some(results),
        _ = cancel.cancelled() => None,
    };
    let deadline = Instant::now() + drain_timeout;
    let results = match finished {
        Some(results) => Some(results),
        None => {
            info!("Shutdown requested, workers finishing current records");
            tokio::time::timeout_at(deadline, &mut all).await.ok()
        }
    };

    let Some(results) = results else {
        aborts.iter().for_each(AbortHandle::abort);
        fatal.trip(format!(
            "workers did not stop within {}ms",
            drain_timeout.as_millis()
        ));
        return deadline;
    };

    for (id, result) in results.into_iter().enumerate() {
        match result.map_err(PipelineError::from).and_then(|stopped| stopped) {
            Ok(()) => {}
            Err(e @ PipelineError::TaskJoin(_)) => {
                error!(worker = id, error = %e, "Worker task failed");
                fatal.trip(format!("worker {id} failed: {e}"));
            }
            Err(e) => error!(worker = id, error = %e, "Worker stopped with error"),
        }
    }
    deadline
}

async fn join_actors(kind: &str, handles: Vec<JoinHandle<()>>) {
    for (shard, result) in join_all(handles).await.into_iter().enumerate() {
        if let Err(e) = result {
            error!(kind, shard, error = %e, "Actor task failed");
        }
    }
}

/// Sends periodic ticks to every shard until `stop` is cancelled.
fn spawn_ticker(router: ShardRouter, every: Duration, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = interval.tick() => router.tick(),
            }
        }
    })
}
