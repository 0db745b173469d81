use crate::{
    env::EnvManager,
    settings::{PipelineSettings, error::SettingsError},
};
use engine_core::{connectors::lookup::StaticRateTable, retry::RetryPolicy};
use model::core::partition::PartitionRule;
use std::{str::FromStr, time::Duration};
use tracing::{info, warn};

pub const BATCH_MAX_RECORDS: &str = "CLICKSTREAM_BATCH_MAX_RECORDS";
pub const BATCH_MAX_BYTES: &str = "CLICKSTREAM_BATCH_MAX_BYTES";
pub const BATCH_MAX_AGE_MS: &str = "CLICKSTREAM_BATCH_MAX_AGE_MS";
pub const DEDUP_CAPACITY: &str = "CLICKSTREAM_DEDUP_CAPACITY";
pub const TICK_INTERVAL_MS: &str = "CLICKSTREAM_TICK_INTERVAL_MS";
pub const MAX_PAST_SKEW_MS: &str = "CLICKSTREAM_MAX_PAST_SKEW_MS";
pub const MAX_FUTURE_SKEW_MS: &str = "CLICKSTREAM_MAX_FUTURE_SKEW_MS";
pub const RETRY_MAX_ATTEMPTS: &str = "CLICKSTREAM_RETRY_MAX_ATTEMPTS";
pub const BACKOFF_BASE_MS: &str = "CLICKSTREAM_BACKOFF_BASE_MS";
pub const BACKOFF_CAP_MS: &str = "CLICKSTREAM_BACKOFF_CAP_MS";
pub const BACKOFF_JITTER: &str = "CLICKSTREAM_BACKOFF_JITTER";
pub const PARTITION_RULE: &str = "CLICKSTREAM_PARTITION_RULE";
pub const WORKERS: &str = "CLICKSTREAM_WORKERS";
pub const SHARDS: &str = "CLICKSTREAM_SHARDS";
pub const POLL_INTERVAL_MS: &str = "CLICKSTREAM_POLL_INTERVAL_MS";
pub const WRITE_TIMEOUT_MS: &str = "CLICKSTREAM_WRITE_TIMEOUT_MS";
pub const LOOKUP_TIMEOUT_MS: &str = "CLICKSTREAM_LOOKUP_TIMEOUT_MS";
pub const DRAIN_TIMEOUT_MS: &str = "CLICKSTREAM_DRAIN_TIMEOUT_MS";
pub const BASE_CURRENCY: &str = "CLICKSTREAM_BASE_CURRENCY";
pub const SESSION_GAP_MS: &str = "CLICKSTREAM_SESSION_GAP_MS";
pub const REDACT_FIELDS: &str = "CLICKSTREAM_REDACT_FIELDS";
pub const MONETARY_FIELDS: &str = "CLICKSTREAM_MONETARY_FIELDS";
pub const RATES: &str = "CLICKSTREAM_RATES";
pub const MAILBOX_CAPACITY: &str = "CLICKSTREAM_MAILBOX_CAPACITY";

/// Turns raw `CLICKSTREAM_*` variables into [`PipelineSettings`].
///
/// Every problem is collected before failing so a misconfigured deployment
/// sees all of them at once.
pub struct SettingsValidator<'a> {
    env: &'a EnvManager,
    errors: Vec<String>,
}

impl<'a> SettingsValidator<'a> {
    pub fn new(env: &'a EnvManager) -> Self {
        Self {
            env,
            errors: Vec::new(),
        }
    }

    pub fn validate(mut self) -> Result<PipelineSettings, SettingsError> {
        let mut settings = PipelineSettings::default();

        self.validate_window(&mut settings);
        self.validate_skew(&mut settings);
        self.validate_retry(&mut settings);
        self.validate_transform(&mut settings);
        self.validate_runtime(&mut settings);

        if !self.errors.is_empty() {
            return Err(SettingsError::ValidationFailed(self.errors));
        }

        self.check_conflicts(&settings);
        info!(
            max_records = settings.window.max_records,
            max_bytes = settings.window.max_bytes,
            max_age_ms = settings.window.max_age.as_millis() as u64,
            workers = settings.runtime.workers,
            shards = settings.runtime.shards,
            partition_rule = %settings.transform.partition_rule,
            "Pipeline settings validated"
        );

        Ok(settings)
    }

    fn validate_window(&mut self, settings: &mut PipelineSettings) {
        let window = &mut settings.window;
        if let Some(v) = self.positive::<usize>(BATCH_MAX_RECORDS) {
            window.max_records = v;
        }
        if let Some(v) = self.positive::<usize>(BATCH_MAX_BYTES) {
            window.max_bytes = v;
        }
        if let Some(v) = self.millis(BATCH_MAX_AGE_MS, false) {
            window.max_age = v;
        }
        if let Some(v) = self.parsed::<usize>(DEDUP_CAPACITY) {
            window.dedup_capacity = v;
        }
    }

    fn validate_skew(&mut self, settings: &mut PipelineSettings) {
        if let Some(v) = self.millis(MAX_PAST_SKEW_MS, true) {
            settings.skew.max_past = v;
        }
        if let Some(v) = self.millis(MAX_FUTURE_SKEW_MS, true) {
            settings.skew.max_future = v;
        }
    }

    fn validate_retry(&mut self, settings: &mut PipelineSettings) {
        let defaults = RetryPolicy::default();
        let max_attempts = self
            .positive::<u32>(RETRY_MAX_ATTEMPTS)
            .unwrap_or(defaults.max_attempts);
        let base = self
            .millis(BACKOFF_BASE_MS, true)
            .unwrap_or(defaults.base_delay);
        let cap = self
            .millis(BACKOFF_CAP_MS, true)
            .unwrap_or(defaults.max_delay);
        let jitter = self
            .parsed::<f64>(BACKOFF_JITTER)
            .unwrap_or(defaults.jitter_ratio);

        if !(0.0..=1.0).contains(&jitter) {
            self.errors
                .push(format!("{BACKOFF_JITTER} must be within [0, 1], got {jitter}"));
        }
        if cap < base {
            self.errors.push(format!(
                "{BACKOFF_CAP_MS} ({}) must not be below {BACKOFF_BASE_MS} ({})",
                cap.as_millis(),
                base.as_millis()
            ));
        }

        settings.retry = RetryPolicy::new(max_attempts, base, cap, jitter);
    }

    fn validate_transform(&mut self, settings: &mut PipelineSettings) {
        let transform = &mut settings.transform;

        if let Some(rule) = self.parsed::<PartitionRule>(PARTITION_RULE) {
            transform.partition_rule = rule;
        }
        if let Some(v) = self.millis(SESSION_GAP_MS, false) {
            transform.session_gap = v;
        }
        if let Some(v) = self.millis(LOOKUP_TIMEOUT_MS, false) {
            transform.lookup_timeout = v;
        }
        if let Some(fields) = self.list(REDACT_FIELDS) {
            transform.redact_fields = fields;
        }
        if let Some(fields) = self.list(MONETARY_FIELDS) {
            transform.monetary_fields = fields;
        }

        if let Some(code) = self.env.get(BASE_CURRENCY) {
            let code = code.trim().to_ascii_uppercase();
            if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
                transform.base_currency = code;
            } else {
                self.errors
                    .push(format!("{BASE_CURRENCY} must be a 3-letter ISO code, got '{code}'"));
            }
        }

        if let Some(pairs) = self.env.get(RATES) {
            match StaticRateTable::parse_pairs(&transform.base_currency, pairs) {
                Ok(_) => transform.rates = Some(pairs.to_string()),
                Err(e) => self.errors.push(format!("{RATES}: {e}")),
            }
        }
    }

    fn validate_runtime(&mut self, settings: &mut PipelineSettings) {
        let runtime = &mut settings.runtime;
        if let Some(v) = self.positive::<usize>(WORKERS) {
            runtime.workers = v;
        }
        if let Some(v) = self.positive::<usize>(SHARDS) {
            runtime.shards = v;
        }
        if let Some(v) = self.positive::<usize>(MAILBOX_CAPACITY) {
            runtime.mailbox_capacity = v;
        }
        if let Some(v) = self.millis(POLL_INTERVAL_MS, false) {
            runtime.poll_interval = v;
        }
        if let Some(v) = self.millis(TICK_INTERVAL_MS, false) {
            runtime.tick_interval = v;
        }
        if let Some(v) = self.millis(WRITE_TIMEOUT_MS, false) {
            runtime.write_timeout = v;
        }
        if let Some(v) = self.millis(DRAIN_TIMEOUT_MS, false) {
            runtime.drain_timeout = v;
        }
    }

    fn check_conflicts(&self, settings: &PipelineSettings) {
        if settings.runtime.tick_interval > settings.window.max_age {
            warn!(
                tick_ms = settings.runtime.tick_interval.as_millis() as u64,
                max_age_ms = settings.window.max_age.as_millis() as u64,
                "Tick interval exceeds batch max age; stale batches will close late"
            );
        }
        if settings.window.max_records > 100_000 {
            warn!(
                max_records = settings.window.max_records,
                "Batch record limit is very large, may cause memory issues"
            );
        }
    }

    fn parsed<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.env.get(key)?.trim();
        match raw.parse::<T>() {
            Ok(v) => Some(v),
            Err(e) => {
                self.errors.push(
                    SettingsError::InvalidValue {
                        key: key.to_string(),
                        value: raw.to_string(),
                        reason: e.to_string(),
                    }
                    .to_string(),
                );
                None
            }
        }
    }

    fn positive<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr + Default + PartialOrd + Copy,
        T::Err: std::fmt::Display,
    {
        let v = self.parsed::<T>(key)?;
        if v <= T::default() {
            self.errors.push(format!("{key} must be greater than zero"));
            return None;
        }
        Some(v)
    }

    fn millis(&mut self, key: &str, allow_zero: bool) -> Option<Duration> {
        let ms = self.parsed::<u64>(key)?;
        if ms == 0 && !allow_zero {
            self.errors.push(format!("{key} must be greater than zero"));
            return None;
        }
        Some(Duration::from_millis(ms))
    }

    fn list(&mut self, key: &str) -> Option<Vec<String>> {
        let raw = self.env.get(key)?;
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvManager {
        let mut env = EnvManager::empty();
        for (k, v) in pairs {
            env.set(*k, *v);
        }
        env
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let settings = PipelineSettings::from_env(&EnvManager::empty()).unwrap();
        assert_eq!(settings, PipelineSettings::default());
        assert_eq!(settings.window.max_records, 500);
        assert_eq!(settings.window.max_bytes, 8_388_608);
        assert_eq!(settings.window.dedup_capacity, 100_000);
        assert_eq!(settings.skew.max_past, Duration::from_secs(86_400));
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.transform.partition_rule, PartitionRule::DailyByType);
    }

    #[test]
    fn overrides_are_applied() {
        let settings = PipelineSettings::from_env(&env(&[
            (BATCH_MAX_RECORDS, "10"),
            (BATCH_MAX_AGE_MS, "2500"),
            (DEDUP_CAPACITY, "0"),
            (PARTITION_RULE, "hourly_by_type"),
            (REDACT_FIELDS, "email, phone ,"),
            (BASE_CURRENCY, "eur"),
            (RATES, "USD=0.92"),
        ]))
        .unwrap();

        assert_eq!(settings.window.max_records, 10);
        assert_eq!(settings.window.max_age, Duration::from_millis(2500));
        assert_eq!(settings.window.dedup_capacity, 0);
        assert_eq!(settings.transform.partition_rule, PartitionRule::HourlyByType);
        assert_eq!(settings.transform.redact_fields, vec!["email", "phone"]);
        assert_eq!(settings.transform.base_currency, "EUR");
        assert_eq!(settings.transform.rates.as_deref(), Some("USD=0.92"));
    }

    #[test]
    fn collects_every_violation() {
        let err = PipelineSettings::from_env(&env(&[
            (BATCH_MAX_RECORDS, "0"),
            (WORKERS, "many"),
            (BACKOFF_JITTER, "1.5"),
            (BACKOFF_BASE_MS, "1000"),
            (BACKOFF_CAP_MS, "10"),
        ]))
        .unwrap_err();

        let SettingsError::ValidationFailed(errors) = err else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains(WORKERS)));
    }
}
