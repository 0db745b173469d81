use crate::{clock::Clock, error::SourceError};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use model::records::raw::RawRecord;
use std::{
    collections::VecDeque,
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Outcome of a single poll against an ingestion source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePoll {
    Ready(RawRecord),
    /// Nothing available right now; poll again later.
    Idle,
    /// The source is exhausted and will never yield again.
    Finished,
}

/// An at-least-once stream of raw records.
///
/// `poll` must be cancel-safe: dropping an unfinished poll future must not
/// lose a record. Workers abandon a pending poll on shutdown.
#[async_trait]
pub trait IngestSource: Send + Sync {
    async fn poll(&self) -> Result<SourcePoll, SourceError>;
}

/// Replays newline-delimited payloads from every `*.jsonl`, `*.json` or
/// gzipped `*.gz` file in a directory, in file-name order. Each file name is
/// the source key of its records. Blank lines are skipped.
pub struct DirectorySource {
    clock: Arc<dyn Clock>,
    state: Mutex<DirectoryState>,
}

struct DirectoryState {
    files: VecDeque<PathBuf>,
    pending: VecDeque<String>,
    current_key: String,
}

impl DirectorySource {
    pub fn open(dir: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let read_err = |source| SourceError::Read {
            source_key: dir.display().to_string(),
            source,
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            let is_payload = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e, "jsonl" | "json" | "gz"));
            if path.is_file() && is_payload {
                files.push(path);
            }
        }
        files.sort();

        info!(dir = %dir.display(), files = files.len(), "Opened directory source");

        Ok(Self {
            clock,
            state: Mutex::new(DirectoryState {
                files: files.into(),
                pending: VecDeque::new(),
                current_key: String::new(),
            }),
        })
    }
}

#[async_trait]
impl IngestSource for DirectorySource {
    async fn poll(&self) -> Result<SourcePoll, SourceError> {
        let mut state = self.state.lock().await;

        loop {
            if let Some(line) = state.pending.pop_front() {
                let record = RawRecord::new(line, state.current_key.clone(), self.clock.now());
                return Ok(SourcePoll::Ready(record));
            }

            // Dequeued only after the read so a cancelled poll retries the file.
            let Some(path) = state.files.front().cloned() else {
                return Ok(SourcePoll::Finished);
            };

            let key = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let read = read_payload(&path).await;
            state.files.pop_front();
            let contents = read.map_err(|source| SourceError::Read {
                source_key: key.clone(),
                source,
            })?;

            state.pending = contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            debug!(source_key = %key, records = state.pending.len(), "Loaded source file");
            state.current_key = key;
        }
    }
}

async fn read_payload(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    if path.extension().is_some_and(|e| e == "gz") {
        let mut contents = String::new();
        GzDecoder::new(bytes.as_slice()).read_to_string(&mut contents)?;
        return Ok(contents);
    }
    String::from_utf8(bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
