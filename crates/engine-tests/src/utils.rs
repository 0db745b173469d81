use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use engine_core::{
    connectors::{
        dead_letter::DeadLetterChannel,
        lookup::RateLookup,
        sink::StorageSink,
        source::{IngestSource, SourcePoll},
    },
    error::{DeadLetterError, LookupError, SinkError, SourceError},
};
use model::{execution::dead_letter::DeadLetterEntry, records::raw::RawRecord};
use rust_decimal::Decimal;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Event payload in the canonical envelope.
pub fn event(id: &str, event_type: &str, user: &str, ts: DateTime<Utc>, attrs: &str) -> String {
    format!(
        r#"{{"id":"{id}","type":"{event_type}","ts":"{}","user_id":"{user}","attrs":{attrs}}}"#,
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

pub fn page_view(id: &str, user: &str, ts: DateTime<Utc>) -> String {
    event(id, "page_view", user, ts, r#"{"page_url":"/home"}"#)
}

/// Source over fixed payloads. Once drained it either finishes or, when
/// `stay_open` is set, keeps reporting `Idle` like a live stream.
pub struct MemorySource {
    payloads: Mutex<VecDeque<String>>,
    stay_open: bool,
    arrival: DateTime<Utc>,
    attempt: u32,
}

impl MemorySource {
    pub fn finite(payloads: Vec<String>, arrival: DateTime<Utc>) -> Self {
        Self {
            payloads: Mutex::new(payloads.into()),
            stay_open: false,
            arrival,
            attempt: 1,
        }
    }

    /// Delivers every payload as a redelivery with the given attempt number.
    pub fn redelivered(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn streaming(payloads: Vec<String>, arrival: DateTime<Utc>) -> Self {
        Self {
            stay_open: true,
            ..Self::finite(payloads, arrival)
        }
    }
}

#[async_trait]
impl IngestSource for MemorySource {
    async fn poll(&self) -> Result<SourcePoll, SourceError> {
        let next = self.payloads.lock().unwrap().pop_front();
        Ok(match next {
            Some(payload) => SourcePoll::Ready(
                RawRecord::new(payload, "memory-0", self.arrival).with_attempt(self.attempt),
            ),
            None if self.stay_open => SourcePoll::Idle,
            None => SourcePoll::Finished,
        })
    }
}

/// Source whose poll never completes, like a stream with no traffic.
pub struct StalledSource;

#[async_trait]
impl IngestSource for StalledSource {
    async fn poll(&self) -> Result<SourcePoll, SourceError> {
        std::future::pending().await
    }
}

/// Object store kept in memory.
#[derive(Default)]
pub struct MemorySink {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    puts: AtomicUsize,
}

impl MemorySink {
    pub fn objects(&self) -> BTreeMap<String, Vec<u8>> {
        self.objects.lock().unwrap().clone()
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn event_ids(&self) -> Vec<String> {
        self.objects()
            .values()
            .flat_map(|bytes| {
                String::from_utf8_lossy(bytes)
                    .lines()
                    .map(|l| {
                        let row: serde_json::Value = serde_json::from_str(l).unwrap();
                        row["event_id"].as_str().unwrap().to_string()
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), SinkError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Storage that never acknowledges within the writer's timeout.
pub struct StalledSink {
    pub stall: Duration,
    pub puts: AtomicUsize,
}

impl StalledSink {
    pub fn new(stall: Duration) -> Self {
        Self {
            stall,
            puts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StorageSink for StalledSink {
    async fn put(&self, _path: &str, _bytes: &[u8]) -> Result<(), SinkError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.stall).await;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDeadLetters {
    entries: Mutex<Vec<DeadLetterEntry>>,
    offline: bool,
}

impl MemoryDeadLetters {
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Default::default()
        }
    }

    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterChannel for MemoryDeadLetters {
    async fn emit(&self, entry: &DeadLetterEntry) -> Result<(), DeadLetterError> {
        if self.offline {
            return Err(DeadLetterError::Unavailable("connection refused".into()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeadLetterEntry>, DeadLetterError> {
        Ok(self.entries())
    }
}

/// USD rate table whose first `failures` lookups report the service as
/// unavailable.
pub struct FlakyRates {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyRates {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_down() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateLookup for FlakyRates {
    fn base_currency(&self) -> &str {
        "USD"
    }

    async fn lookup(&self, currency: &str) -> Result<Decimal, LookupError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(LookupError::Unavailable {
                key: currency.to_string(),
                reason: "rate service returned 503".into(),
            });
        }
        Ok(Decimal::new(108, 2))
    }
}

/// Rate table that answers every lookup after a fixed delay.
pub struct SlowRates {
    pub delay: Duration,
}

#[async_trait]
impl RateLookup for SlowRates {
    fn base_currency(&self) -> &str {
        "USD"
    }

    async fn lookup(&self, _currency: &str) -> Result<Decimal, LookupError> {
        tokio::time::sleep(self.delay).await;
        Ok(Decimal::new(108, 2))
    }
}
