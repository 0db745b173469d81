use engine_core::metrics::MetricsSnapshot;
use serde::Serialize;
use std::{fmt, time::Duration};

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The source was exhausted and everything drained.
    Completed,
    /// A shutdown signal stopped ingestion; everything in flight drained.
    Cancelled,
    Fatal { reason: String },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
            RunOutcome::Fatal { reason } => write!(f, "fatal: {reason}"),
        }
    }
}

/// Final accounting of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub records_received: u64,
    pub records_written: u64,
    pub batches_written: u64,
    pub bytes_written: u64,
    pub records_dead_lettered: u64,
    pub dead_letter_entries: u64,
    pub duplicates_dropped: u64,
    /// Records held by a retry loop when the summary was taken.
    pub retrying: u64,
    /// Records received but not yet written, dead-lettered, dropped as
    /// duplicates or retrying.
    /// Non-zero only when a run halts before its drain completes.
    pub in_flight: u64,
    pub retries: u64,
    pub failures: u64,
    pub elapsed_ms: u64,
    pub outcome: RunOutcome,
}

impl PipelineSummary {
    pub fn from_snapshot(snapshot: MetricsSnapshot, elapsed: Duration, outcome: RunOutcome) -> Self {
        let in_flight = snapshot
            .records_received
            .saturating_sub(snapshot.records_written)
            .saturating_sub(snapshot.records_dead_lettered)
            .saturating_sub(snapshot.duplicates_dropped)
            .saturating_sub(snapshot.retrying);

        Self {
            records_received: snapshot.records_received,
            records_written: snapshot.records_written,
            batches_written: snapshot.batches_written,
            bytes_written: snapshot.bytes_written,
            records_dead_lettered: snapshot.records_dead_lettered,
            dead_letter_entries: snapshot.dead_letter_entries,
            duplicates_dropped: snapshot.duplicates_dropped,
            retrying: snapshot.retrying,
            in_flight,
            retries: snapshot.retry_count,
            failures: snapshot.failure_count,
            elapsed_ms: elapsed.as_millis() as u64,
            outcome,
        }
    }

    /// True when every received record ended up written, dead-lettered or
    /// dropped as a duplicate.
    pub fn is_settled(&self) -> bool {
        self.records_received
            == self.records_written + self.records_dead_lettered + self.duplicates_dropped
    }
}
