use crate::{
    error::PipelineError,
    orchestrator::{Collaborators, Orchestrator},
    summary::RunOutcome,
    tests::fakes::{MemoryDeadLetters, MemorySink, PanickingSource, VecSource, page_view},
};
use engine_config::settings::PipelineSettings;
use engine_core::{
    clock::SystemClock, connectors::lookup::StaticRateTable, error::SinkError,
    retry::RetryPolicy,
};
use model::execution::failure::FailureKind;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

fn settings() -> PipelineSettings {
    let mut settings = PipelineSettings::default();
    settings.runtime.workers = 2;
    settings.runtime.shards = 2;
    settings.runtime.poll_interval = Duration::from_millis(5);
    settings.runtime.tick_interval = Duration::from_millis(10);
    settings.runtime.write_timeout = Duration::from_secs(1);
    settings.runtime.drain_timeout = Duration::from_secs(5);
    settings.retry = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5), 0.0);
    settings
}

fn collaborators(
    payloads: Vec<String>,
    sink: Arc<MemorySink>,
    dead_letters: Arc<MemoryDeadLetters>,
) -> Collaborators {
    Collaborators {
        source: Arc::new(VecSource::new(payloads)),
        sink,
        dead_letters,
        rates: Arc::new(StaticRateTable::usd_defaults()),
        clock: Arc::new(SystemClock),
    }
}

#[tokio::test]
async fn writes_valid_events_and_dead_letters_the_rest() {
    let sink = Arc::new(MemorySink::default());
    let dlq = Arc::new(MemoryDeadLetters::default());
    let payloads = vec![
        page_view("e1", "u1"),
        page_view("e2", "u2"),
        r#"{"type":"page_view","user_id":"u3"}"#.to_string(),
        page_view("e3", "u1"),
    ];

    let summary = Orchestrator::new(
        settings(),
        collaborators(payloads, sink.clone(), dlq.clone()),
        CancellationToken::new(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.records_received, 4);
    assert_eq!(summary.records_written, 3);
    assert_eq!(summary.records_dead_lettered, 1);
    assert_eq!(summary.retries, 0);
    assert!(summary.is_settled());
    assert_eq!(sink.lines(), 3);

    let entries = dlq.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, FailureKind::SchemaViolation { field: "id".into() });
    assert_eq!(entries[0].history.len(), 1);
}

#[tokio::test]
async fn transient_sink_failures_are_retried() {
    let sink = Arc::new(MemorySink::failing_with(vec![
        SinkError::Timeout(Duration::from_millis(1)),
        SinkError::Unavailable("throttled".into()),
    ]));
    let dlq = Arc::new(MemoryDeadLetters::default());

    let summary = Orchestrator::new(
        settings(),
        collaborators(vec![page_view("e1", "u1")], sink.clone(), dlq.clone()),
        CancellationToken::new(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.records_written, 1);
    assert_eq!(summary.batches_written, 1);
    assert_eq!(summary.retries, 2);
    assert_eq!(summary.failures, 2);
    assert_eq!(summary.retrying, 0);
    assert_eq!(sink.puts(), 3);
    assert!(dlq.entries().is_empty());
}

#[tokio::test]
async fn failed_dead_letter_emission_halts_the_run() {
    let sink = Arc::new(MemorySink::default());
    let dlq = Arc::new(MemoryDeadLetters::broken());

    let err = Orchestrator::new(
        settings(),
        collaborators(vec!["{not json".to_string()], sink, dlq),
        CancellationToken::new(),
    )
    .run()
    .await
    .unwrap_err();

    match err {
        PipelineError::Fatal { reason, summary } => {
            assert!(reason.contains("could not dead-letter"));
            assert_eq!(summary.records_received, 1);
            assert_eq!(summary.records_dead_lettered, 0);
            assert_eq!(summary.in_flight, 1);
            assert!(matches!(summary.outcome, RunOutcome::Fatal { .. }));
        }
        other => panic!("expected fatal, got {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_before_start_pulls_nothing() {
    let sink = Arc::new(MemorySink::default());
    let dlq = Arc::new(MemoryDeadLetters::default());
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let summary = Orchestrator::new(
        settings(),
        collaborators(vec![page_view("e1", "u1")], sink.clone(), dlq),
        shutdown,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Cancelled);
    assert_eq!(summary.records_received, 0);
    assert_eq!(sink.puts(), 0);
}

#[tokio::test]
async fn crashed_worker_task_is_fatal() {
    let mut collaborators = collaborators(
        vec![],
        Arc::new(MemorySink::default()),
        Arc::new(MemoryDeadLetters::default()),
    );
    collaborators.source = Arc::new(PanickingSource);
    let mut settings = settings();
    settings.runtime.workers = 1;

    let err = Orchestrator::new(settings, collaborators, CancellationToken::new())
        .run()
        .await
        .unwrap_err();

    match err {
        PipelineError::Fatal { reason, summary } => {
            assert!(reason.starts_with("worker 0 failed: Task join error"), "{reason}");
            assert_eq!(summary.records_received, 0);
        }
        other => panic!("expected fatal, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_deliveries_close_the_accounting() {
    let sink = Arc::new(MemorySink::default());
    let mut settings = settings();
    settings.runtime.workers = 1;

    let summary = Orchestrator::new(
        settings,
        collaborators(
            vec![page_view("e1", "u1"), page_view("e1", "u1")],
            sink.clone(),
            Arc::new(MemoryDeadLetters::default()),
        ),
        CancellationToken::new(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.records_received, 2);
    assert_eq!(summary.records_written, 1);
    assert_eq!(summary.duplicates_dropped, 1);
    assert_eq!(summary.in_flight, 0);
    assert!(summary.is_settled());
    assert_eq!(sink.lines(), 1);
}
