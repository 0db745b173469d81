use crate::error::TransformError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use currency::CurrencyStep;
use engine_config::settings::TransformSettings;
use engine_core::connectors::lookup::RateLookup;
use model::{
    core::{identifiers::PartitionKey, value::Value},
    events::{EnrichedEvent, EventType, ValidatedEvent},
};
use std::{collections::BTreeMap, sync::Arc};
use steps::{DerivedFieldsStep, FlattenStep, PartitionStep, RedactStep, SessionStep, TimestampStep};

pub mod currency;
pub mod steps;

/// Working copy of an event while the enrichment steps run.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub session_id: Option<String>,
    pub attributes: BTreeMap<String, Value>,
    pub enrichment: BTreeMap<String, Value>,
    pub partition_key: Option<PartitionKey>,
}

impl From<&ValidatedEvent> for EventDraft {
    fn from(event: &ValidatedEvent) -> Self {
        Self {
            event_id: event.event_id.clone(),
            event_type: event.event_type,
            timestamp: event.timestamp,
            user_id: event.user_id.clone(),
            session_id: event.session_id.clone(),
            attributes: event.attributes.clone(),
            enrichment: BTreeMap::new(),
            partition_key: None,
        }
    }
}

impl EventDraft {
    fn finish(self) -> Result<EnrichedEvent, TransformError> {
        let missing = |step: &'static str| TransformError::Enrichment {
            step,
            reason: "step did not produce a value".into(),
        };

        Ok(EnrichedEvent {
            session_id: self.session_id.ok_or_else(|| missing("session"))?,
            partition_key: self.partition_key.ok_or_else(|| missing("partition"))?,
            event_id: self.event_id,
            event_type: self.event_type,
            timestamp: self.timestamp,
            user_id: self.user_id,
            attributes: self.attributes,
            enrichment: self.enrichment,
        })
    }
}

/// One enrichment step. Steps run in a fixed order over the same draft.
#[async_trait]
pub trait TransformStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, draft: &mut EventDraft) -> Result<(), TransformError>;
}

/// Runs the enrichment steps over validated events.
#[derive(Clone)]
pub struct Transformer {
    steps: Vec<Arc<dyn TransformStep>>,
}

impl Transformer {
    pub fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    /// The standard step order: timestamp, session, flatten, redact,
    /// currency, derived fields, partition.
    pub fn new(settings: &TransformSettings, rates: Arc<dyn RateLookup>) -> Self {
        Self::empty()
            .add_step(TimestampStep)
            .add_step(SessionStep::new(settings.session_gap))
            .add_step(FlattenStep)
            .add_step(RedactStep::new(settings.redact_fields.clone()))
            .add_step(CurrencyStep::new(
                settings.monetary_fields.clone(),
                rates,
                settings.lookup_timeout,
            ))
            .add_step(DerivedFieldsStep)
            .add_step(PartitionStep::new(settings.partition_rule))
    }

    pub fn add_step<T: TransformStep + 'static>(mut self, step: T) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub async fn transform(&self, event: &ValidatedEvent) -> Result<EnrichedEvent, TransformError> {
        let mut draft = EventDraft::from(event);
        for step in &self.steps {
            step.apply(&mut draft).await?;
        }
        draft.finish()
    }
}
