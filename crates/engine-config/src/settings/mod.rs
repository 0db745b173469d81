use crate::env::EnvManager;
use engine_core::retry::RetryPolicy;
use error::SettingsError;
use model::core::partition::PartitionRule;
use std::time::Duration;
use validator::SettingsValidator;

pub mod error;
pub mod validator;

/// Thresholds that close an open batch.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowLimits {
    pub max_records: usize,
    pub max_bytes: usize,
    pub max_age: Duration,
    /// Event ids remembered per shard for duplicate suppression; 0 disables it.
    pub dedup_capacity: usize,
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self {
            max_records: 500,
            max_bytes: 8 * 1024 * 1024,
            max_age: Duration::from_secs(60),
            dedup_capacity: 100_000,
        }
    }
}

/// Accepted distance between an event timestamp and the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkewBounds {
    pub max_past: Duration,
    pub max_future: Duration,
}

impl Default for SkewBounds {
    fn default() -> Self {
        Self {
            max_past: Duration::from_secs(24 * 60 * 60),
            max_future: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformSettings {
    pub partition_rule: PartitionRule,
    pub session_gap: Duration,
    pub redact_fields: Vec<String>,
    pub monetary_fields: Vec<String>,
    pub base_currency: String,
    pub lookup_timeout: Duration,
    /// `CODE=RATE` pairs for the static rate table; `None` uses built-in rates.
    pub rates: Option<String>,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            partition_rule: PartitionRule::default(),
            session_gap: Duration::from_secs(30 * 60),
            redact_fields: vec!["ip_address".into(), "email".into()],
            monetary_fields: vec!["amount".into(), "product_price".into()],
            base_currency: "USD".into(),
            lookup_timeout: Duration::from_secs(2),
            rates: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub workers: usize,
    pub shards: usize,
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    pub write_timeout: Duration,
    pub drain_timeout: Duration,
    /// Capacity of every actor mailbox.
    pub mailbox_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            shards: 4,
            poll_interval: Duration::from_millis(100),
            tick_interval: Duration::from_secs(1),
            write_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(120),
            mailbox_capacity: 1024,
        }
    }
}

/// Immutable, validated configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineSettings {
    pub window: WindowLimits,
    pub skew: SkewBounds,
    pub transform: TransformSettings,
    pub retry: RetryPolicy,
    pub runtime: RuntimeSettings,
}

impl PipelineSettings {
    /// Builds settings from `CLICKSTREAM_*` variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env(env: &EnvManager) -> Result<Self, SettingsError> {
        SettingsValidator::new(env).validate()
    }
}
