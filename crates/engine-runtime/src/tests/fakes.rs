use async_trait::async_trait;
use chrono::Utc;
use engine_core::{
    connectors::{
        dead_letter::DeadLetterChannel,
        sink::StorageSink,
        source::{IngestSource, SourcePoll},
    },
    error::{DeadLetterError, SinkError, SourceError},
};
use model::{execution::dead_letter::DeadLetterEntry, records::raw::RawRecord};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Mutex,
};

/// Yields the given payloads once, then reports `Finished`.
pub struct VecSource {
    payloads: Mutex<VecDeque<String>>,
}

impl VecSource {
    pub fn new(payloads: Vec<String>) -> Self {
        Self {
            payloads: Mutex::new(payloads.into()),
        }
    }
}

#[async_trait]
impl IngestSource for VecSource {
    async fn poll(&self) -> Result<SourcePoll, SourceError> {
        Ok(match self.payloads.lock().unwrap().pop_front() {
            Some(p) => SourcePoll::Ready(RawRecord::new(p, "mem-0", Utc::now())),
            None => SourcePoll::Finished,
        })
    }
}

/// Source whose poll panics, taking its worker task down.
pub struct PanickingSource;

#[async_trait]
impl IngestSource for PanickingSource {
    async fn poll(&self) -> Result<SourcePoll, SourceError> {
        panic!("source client crashed");
    }
}

/// In-memory object store. Scripted failures are returned first, in order.
#[derive(Default)]
pub struct MemorySink {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failures: Mutex<VecDeque<SinkError>>,
    puts: Mutex<usize>,
}

impl MemorySink {
    pub fn failing_with(failures: Vec<SinkError>) -> Self {
        Self {
            failures: Mutex::new(failures.into()),
            ..Default::default()
        }
    }

    pub fn objects(&self) -> BTreeMap<String, Vec<u8>> {
        self.objects.lock().unwrap().clone()
    }

    pub fn lines(&self) -> usize {
        self.objects()
            .values()
            .map(|b| b.iter().filter(|c| **c == b'\n').count())
            .sum()
    }

    pub fn puts(&self) -> usize {
        *self.puts.lock().unwrap()
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), SinkError> {
        *self.puts.lock().unwrap() += 1;
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDeadLetters {
    entries: Mutex<Vec<DeadLetterEntry>>,
    broken: bool,
}

impl MemoryDeadLetters {
    pub fn broken() -> Self {
        Self {
            broken: true,
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
        if self.broken {
            return Err(DeadLetterError::Unavailable("store offline".into()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeadLetterEntry>, DeadLetterError> {
        Ok(self.entries())
    }
}

pub fn page_view(id: &str, user: &str) -> String {
    format!(
        r#"{{"id":"{id}","type":"page_view","ts":"{}","user_id":"{user}","attrs":{{"page_url":"/home"}}}}"#,
        Utc::now().to_rfc3339()
    )
}
