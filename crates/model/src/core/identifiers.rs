use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Grouping key of a batch, rendered as a Hive-style path prefix
/// (`event_type=purchase/year=2026/month=10/day=16`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey(Arc<str>);

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::from(key.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PartitionKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for PartitionKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
