use crate::core::{identifiers::PartitionKey, value::Value};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Kinds of clickstream events accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    AddToCart,
    RemoveFromCart,
    Purchase,
    Search,
    Login,
    Logout,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::PageView,
        EventType::AddToCart,
        EventType::RemoveFromCart,
        EventType::Purchase,
        EventType::Search,
        EventType::Login,
        EventType::Logout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::AddToCart => "add_to_cart",
            EventType::RemoveFromCart => "remove_from_cart",
            EventType::Purchase => "purchase",
            EventType::Search => "search",
            EventType::Login => "login",
            EventType::Logout => "logout",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type '{s}'"))
    }
}

/// An event that passed envelope and schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub session_id: Option<String>,
    pub attributes: BTreeMap<String, Value>,
    /// Ingestion partition the raw record arrived on.
    pub source_key: String,
}

/// A validated event after enrichment; the unit stored in batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub session_id: String,
    pub partition_key: PartitionKey,
    /// Flattened, redacted and currency-normalized payload attributes.
    pub attributes: BTreeMap<String, Value>,
    /// Fields derived by the transformer (date parts, revenue, ...).
    pub enrichment: BTreeMap<String, Value>,
}

impl EnrichedEvent {
    /// Flat JSON row as written to storage. Attribute names never shadow the
    /// envelope columns, and enrichment fields win over attributes.
    pub fn to_row(&self) -> serde_json::Value {
        let mut row = serde_json::Map::new();

        for (k, v) in &self.attributes {
            row.insert(k.clone(), v.to_json());
        }
        for (k, v) in &self.enrichment {
            row.insert(k.clone(), v.to_json());
        }

        row.insert("event_id".into(), self.event_id.clone().into());
        row.insert("event_type".into(), self.event_type.as_str().into());
        row.insert(
            "event_timestamp".into(),
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .into(),
        );
        row.insert("user_id".into(), self.user_id.clone().into());
        row.insert("session_id".into(), self.session_id.clone().into());

        serde_json::Value::Object(row)
    }

    /// Encoded size of [`Self::to_row`] plus the trailing newline.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.to_row())
            .map(|b| b.len() + 1)
            .unwrap_or(0)
    }
}
