use crate::error::SinkError;
use async_trait::async_trait;
use std::{
    io::{ErrorKind, Write},
    path::{Component, Path, PathBuf},
};
use tracing::debug;

/// Object-store style destination. A successful `put` means the object is
/// durably stored; putting the same path twice replaces the object.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), SinkError>;
}

/// Stores objects as files under a root directory. Writes go to a temporary
/// sibling which is fsynced and renamed into place, so readers never observe
/// a partial object.
#[derive(Debug, Clone)]
pub struct LocalFsSink {
    root: PathBuf,
}

impl LocalFsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, SinkError> {
        let relative = Path::new(path);
        let valid = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(SinkError::InvalidDestination(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), SinkError> {
        let parent = target
            .parent()
            .ok_or_else(|| SinkError::InvalidDestination(target.display().to_string()))?;
        std::fs::create_dir_all(parent).map_err(|e| map_io(e, target))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        let written = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            std::fs::rename(&tmp, target)?;
            #[cfg(unix)]
            std::fs::File::open(parent)?.sync_all()?;
            Ok(())
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(map_io(e, target));
        }
        Ok(())
    }
}

fn map_io(err: std::io::Error, target: &Path) -> SinkError {
    match err.kind() {
        ErrorKind::PermissionDenied => SinkError::PermissionDenied(target.display().to_string()),
        ErrorKind::StorageFull => SinkError::QuotaExceeded(target.display().to_string()),
        _ => SinkError::Io(err),
    }
}

#[async_trait]
impl StorageSink for LocalFsSink {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), SinkError> {
        let target = self.resolve(path)?;
        let payload = bytes.to_vec();
        let len = payload.len();

        let dest = target.clone();
        tokio::task::spawn_blocking(move || Self::write_atomic(&dest, &payload))
            .await
            .map_err(|e| SinkError::Unavailable(format!("write task failed: {e}")))??;

        debug!(path = %target.display(), bytes = len, "Stored object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_replaces_existing_object() {
        let dir = tempdir().unwrap();
        let sink = LocalFsSink::new(dir.path());

        sink.put("year=2026/part-1-000000.jsonl", b"first\n").await.unwrap();
        sink.put("year=2026/part-1-000000.jsonl", b"second\n").await.unwrap();

        let stored =
            std::fs::read_to_string(dir.path().join("year=2026/part-1-000000.jsonl")).unwrap();
        assert_eq!(stored, "second\n");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("year=2026"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn rejects_paths_escaping_the_root() {
        let dir = tempdir().unwrap();
        let sink = LocalFsSink::new(dir.path());

        for bad in ["", "../escape.jsonl", "/abs/part.jsonl", "a/../b"] {
            let err = sink.put(bad, b"x").await.unwrap_err();
            assert!(matches!(err, SinkError::InvalidDestination(_)), "{bad}: {err}");
        }
    }
}
