use chrono::{DateTime, Utc};
use model::{core::identifiers::PartitionKey, events::EnrichedEvent};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Open,
    Closing,
    Closed,
}

/// Why a batch stopped accepting events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Records,
    Bytes,
    Age,
    Drain,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Records => "records",
            CloseReason::Bytes => "bytes",
            CloseReason::Age => "age",
            CloseReason::Drain => "drain",
        };
        f.write_str(s)
    }
}

/// Events sharing one partition key, written together as one object.
///
/// Only the windower mutates a batch; once `Closed` it is immutable and owned
/// by whoever it was handed to.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    partition_key: PartitionKey,
    state: BatchState,
    events: Vec<EnrichedEvent>,
    size_bytes: usize,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    close_seq: Option<u64>,
    close_reason: Option<CloseReason>,
}

impl Batch {
    pub(crate) fn open(partition_key: PartitionKey, now: DateTime<Utc>) -> Self {
        Self {
            partition_key,
            state: BatchState::Open,
            events: Vec::new(),
            size_bytes: 0,
            opened_at: now,
            closed_at: None,
            close_seq: None,
            close_reason: None,
        }
    }

    pub(crate) fn push(&mut self, event: EnrichedEvent) {
        self.size_bytes += event.encoded_len();
        self.events.push(event);
    }

    pub(crate) fn mark_closing(&mut self, reason: CloseReason) {
        self.state = BatchState::Closing;
        self.close_reason = Some(reason);
    }

    pub(crate) fn seal(mut self, now: DateTime<Utc>, seq: u64) -> Self {
        self.state = BatchState::Closed;
        self.closed_at = Some(now);
        self.close_seq = Some(seq);
        self
    }

    pub fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn events(&self) -> &[EnrichedEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<EnrichedEvent> {
        self.events
    }

    pub fn record_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn close_seq(&self) -> Option<u64> {
        self.close_seq
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Stable identifier for logs: `<key>#<seq>`.
    pub fn id(&self) -> String {
        match self.close_seq {
            Some(seq) => format!("{}#{seq}", self.partition_key),
            None => format!("{}#open", self.partition_key),
        }
    }
}
