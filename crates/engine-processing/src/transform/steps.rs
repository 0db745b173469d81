use super::{EventDraft, TransformStep, currency::round_money};
use crate::error::TransformError;
use async_trait::async_trait;
use chrono::{Datelike, SubsecRound, Timelike};
use model::{core::partition::PartitionRule, core::value::Value, events::EventType};
use rust_decimal::Decimal;
use std::{collections::BTreeMap, time::Duration};

/// Normalizes the event time to UTC with millisecond precision.
pub struct TimestampStep;

#[async_trait]
impl TransformStep for TimestampStep {
    fn name(&self) -> &'static str {
        "timestamp"
    }

    async fn apply(&self, draft: &mut EventDraft) -> Result<(), TransformError> {
        draft.timestamp = draft.timestamp.trunc_subsecs(3);
        Ok(())
    }
}

/// Keeps a supplied session id, otherwise derives one from the user and the
/// session-gap bucket the event falls into.
pub struct SessionStep {
    gap_millis: i64,
}

impl SessionStep {
    pub fn new(gap: Duration) -> Self {
        Self {
            gap_millis: i64::try_from(gap.as_millis()).unwrap_or(i64::MAX).max(1),
        }
    }

    pub fn derive(&self, user_id: &str, ts_millis: i64) -> String {
        let bucket = ts_millis.div_euclid(self.gap_millis);
        let hash = blake3::hash(format!("{user_id}|{bucket}").as_bytes());
        format!("s-{}", &hash.to_hex()[..16])
    }
}

#[async_trait]
impl TransformStep for SessionStep {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn apply(&self, draft: &mut EventDraft) -> Result<(), TransformError> {
        if draft.session_id.is_none() {
            let derived = self.derive(&draft.user_id, draft.timestamp.timestamp_millis());
            draft.session_id = Some(derived);
        }
        Ok(())
    }
}

/// Flattens nested attribute maps into dotted keys. A key that already exists
/// at the top level is never overwritten by a flattened one.
pub struct FlattenStep;

impl FlattenStep {
    fn flatten_into(prefix: &str, map: BTreeMap<String, Value>, out: &mut Vec<(String, Value)>) {
        for (key, value) in map {
            let path = format!("{prefix}.{key}");
            match value {
                Value::Map(inner) => Self::flatten_into(&path, inner, out),
                other => out.push((path, other)),
            }
        }
    }
}

#[async_trait]
impl TransformStep for FlattenStep {
    fn name(&self) -> &'static str {
        "flatten"
    }

    async fn apply(&self, draft: &mut EventDraft) -> Result<(), TransformError> {
        if !draft.attributes.values().any(Value::is_map) {
            return Ok(());
        }

        let mut nested = Vec::new();
        let mut flat = BTreeMap::new();
        for (key, value) in std::mem::take(&mut draft.attributes) {
            match value {
                Value::Map(inner) => Self::flatten_into(&key, inner, &mut nested),
                other => {
                    flat.insert(key, other);
                }
            }
        }
        for (key, value) in nested {
            flat.entry(key).or_insert(value);
        }

        draft.attributes = flat;
        Ok(())
    }
}

/// Drops sensitive attributes, including flattened ones such as `user.email`.
pub struct RedactStep {
    fields: Vec<String>,
}

impl RedactStep {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let leaf = key.rsplit('.').next().unwrap_or(key);
        self.fields.iter().any(|f| f == key || f == leaf)
    }
}

#[async_trait]
impl TransformStep for RedactStep {
    fn name(&self) -> &'static str {
        "redact"
    }

    async fn apply(&self, draft: &mut EventDraft) -> Result<(), TransformError> {
        draft.attributes.retain(|key, _| !self.is_sensitive(key));
        Ok(())
    }
}

/// Calendar fields and revenue used by downstream reporting.
pub struct DerivedFieldsStep;

impl DerivedFieldsStep {
    fn revenue(draft: &EventDraft) -> Decimal {
        if draft.event_type != EventType::Purchase {
            return Decimal::ZERO;
        }

        let price = draft
            .attributes
            .get("product_price")
            .and_then(Value::as_decimal)
            .unwrap_or_default();
        let quantity = draft
            .attributes
            .get("quantity")
            .and_then(Value::as_decimal)
            .unwrap_or_default();

        price
            .checked_mul(quantity)
            .map(round_money)
            .unwrap_or_default()
    }
}

#[async_trait]
impl TransformStep for DerivedFieldsStep {
    fn name(&self) -> &'static str {
        "derived"
    }

    async fn apply(&self, draft: &mut EventDraft) -> Result<(), TransformError> {
        let ts = draft.timestamp;
        let fields = [
            ("year", format!("{:04}", ts.year())),
            ("month", format!("{:02}", ts.month())),
            ("day", format!("{:02}", ts.day())),
            ("hour", format!("{:02}", ts.hour())),
            ("day_of_week", ts.format("%A").to_string()),
            ("date", ts.format("%Y-%m-%d").to_string()),
        ];
        for (name, value) in fields {
            draft.enrichment.insert(name.to_string(), Value::Str(value));
        }

        let revenue = Self::revenue(draft);
        draft
            .enrichment
            .insert("revenue".to_string(), Value::Decimal(revenue));
        Ok(())
    }
}

pub struct PartitionStep {
    rule: PartitionRule,
}

impl PartitionStep {
    pub fn new(rule: PartitionRule) -> Self {
        Self { rule }
    }
}

#[async_trait]
impl TransformStep for PartitionStep {
    fn name(&self) -> &'static str {
        "partition"
    }

    async fn apply(&self, draft: &mut EventDraft) -> Result<(), TransformError> {
        draft.partition_key = Some(self.rule.derive(draft.event_type, &draft.timestamp));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn draft() -> EventDraft {
        EventDraft {
            event_id: "e1".into(),
            event_type: EventType::PageView,
            timestamp: Utc.with_ymd_and_hms(2026, 10, 17, 23, 15, 0).unwrap(),
            user_id: "u1".into(),
            session_id: None,
            attributes: BTreeMap::new(),
            enrichment: BTreeMap::new(),
            partition_key: None,
        }
    }

    #[test]
    fn sessions_are_stable_within_a_gap() {
        let step = SessionStep::new(Duration::from_secs(30 * 60));
        let a = step.derive("u1", 1_800_000 * 10);
        let b = step.derive("u1", 1_800_000 * 10 + 1_799_999);
        let c = step.derive("u1", 1_800_000 * 11);
        let d = step.derive("u2", 1_800_000 * 10);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[tokio::test]
    async fn supplied_session_is_kept() {
        let mut d = draft();
        d.session_id = Some("given".into());
        SessionStep::new(Duration::from_secs(60)).apply(&mut d).await.unwrap();
        assert_eq!(d.session_id.as_deref(), Some("given"));
    }

    #[tokio::test]
    async fn flatten_keeps_top_level_keys() {
        let mut inner = BTreeMap::new();
        inner.insert("sku".to_string(), Value::from("nested"));
        let mut deeper = BTreeMap::new();
        deeper.insert("cm".to_string(), Value::Int(3));
        inner.insert("size".to_string(), Value::Map(deeper));

        let mut d = draft();
        d.attributes.insert("product".into(), Value::Map(inner));
        d.attributes.insert("product.sku".into(), Value::from("top"));

        FlattenStep.apply(&mut d).await.unwrap();
        assert_eq!(d.attributes["product.sku"], Value::from("top"));
        assert_eq!(d.attributes["product.size.cm"], Value::Int(3));
        assert!(!d.attributes.values().any(Value::is_map));
    }

    #[tokio::test]
    async fn redact_matches_leaf_names() {
        let mut d = draft();
        d.attributes.insert("email".into(), Value::from("a@b.c"));
        d.attributes.insert("user.email".into(), Value::from("a@b.c"));
        d.attributes.insert("emails_sent".into(), Value::Int(1));

        RedactStep::new(vec!["email".into()]).apply(&mut d).await.unwrap();
        assert_eq!(d.attributes.keys().collect::<Vec<_>>(), vec!["emails_sent"]);
    }

    #[tokio::test]
    async fn derives_calendar_fields_and_zero_revenue() {
        let mut d = draft();
        DerivedFieldsStep.apply(&mut d).await.unwrap();

        assert_eq!(d.enrichment["year"], Value::from("2026"));
        assert_eq!(d.enrichment["month"], Value::from("10"));
        assert_eq!(d.enrichment["day"], Value::from("17"));
        assert_eq!(d.enrichment["hour"], Value::from("23"));
        assert_eq!(d.enrichment["day_of_week"], Value::from("Saturday"));
        assert_eq!(d.enrichment["date"], Value::from("2026-10-17"));
        assert_eq!(d.enrichment["revenue"], Value::Decimal(Decimal::ZERO));
    }

    #[tokio::test]
    async fn purchase_revenue_rounds_half_up() {
        let mut d = draft();
        d.event_type = EventType::Purchase;
        d.attributes.insert("product_price".into(), Value::from("0.25"));
        d.attributes.insert("quantity".into(), Value::Float(0.5));

        DerivedFieldsStep.apply(&mut d).await.unwrap();
        assert_eq!(d.enrichment["revenue"].to_string(), "0.13");
    }
}
