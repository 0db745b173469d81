use batch::{Batch, BatchState, CloseReason};
use chrono::{DateTime, TimeDelta, Utc};
use dedup::SeenEvents;
use engine_config::settings::WindowLimits;
use model::{core::identifiers::PartitionKey, events::EnrichedEvent};
use std::collections::HashMap;
use tracing::debug;

pub mod batch;
pub mod dedup;

/// Result of offering an event to the windower.
#[derive(Debug)]
pub enum Admission {
    /// The event was appended; holds the batches that closed, in close order.
    Accepted(Vec<Batch>),
    /// An event with the same id was admitted earlier and the event was dropped.
    Duplicate,
}

impl Admission {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Admission::Duplicate)
    }

    pub fn closed(self) -> Vec<Batch> {
        match self {
            Admission::Accepted(closed) => closed,
            Admission::Duplicate => Vec::new(),
        }
    }
}

impl IntoIterator for Admission {
    type Item = Batch;
    type IntoIter = std::vec::IntoIter<Batch>;

    fn into_iter(self) -> Self::IntoIter {
        self.closed().into_iter()
    }
}

/// Per-key batching state machine.
///
/// The arena holds at most one slot per partition key. A slot is removed the
/// moment its batch closes, returning the key to empty; the close sequence
/// survives in a separate map so it keeps increasing for the key.
///
/// Redelivered events are dropped by id. Partition keys are derived from the
/// event itself and route to a fixed shard, so one windower sees every copy.
#[derive(Debug)]
pub struct Windower {
    limits: WindowLimits,
    max_age: TimeDelta,
    slots: HashMap<PartitionKey, Batch>,
    next_seq: HashMap<PartitionKey, u64>,
    seen: SeenEvents,
}

impl Windower {
    pub fn new(limits: WindowLimits) -> Self {
        let max_age = TimeDelta::from_std(limits.max_age).unwrap_or(TimeDelta::MAX);
        let seen = SeenEvents::new(limits.dedup_capacity);
        Self {
            limits,
            max_age,
            slots: HashMap::new(),
            next_seq: HashMap::new(),
            seen,
        }
    }

    pub fn open_batches(&self) -> usize {
        self.slots.len()
    }

    pub fn buffered_records(&self) -> usize {
        self.slots.values().map(Batch::record_count).sum()
    }

    pub fn state_of(&self, key: &PartitionKey) -> Option<BatchState> {
        self.slots.get(key).map(Batch::state)
    }

    /// Appends an event to its key's open batch and returns any batches that
    /// closed as a result, in close order.
    ///
    /// Thresholds are checked after the append: the event that brings a batch
    /// to `max_records` or `max_bytes` is the last one in it.
    pub fn admit(&mut self, event: EnrichedEvent, now: DateTime<Utc>) -> Admission {
        if !self.seen.insert(&event.event_id) {
            debug!(
                event_id = %event.event_id,
                partition = %event.partition_key,
                "Dropped duplicate event"
            );
            return Admission::Duplicate;
        }

        let key = event.partition_key.clone();
        let mut closed = Vec::new();

        if self.slots.get(&key).is_some_and(|b| self.is_stale(b, now)) {
            closed.extend(self.close(&key, CloseReason::Age, now));
        }

        let batch = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Batch::open(key.clone(), now));
        batch.push(event);

        let reason = if batch.record_count() >= self.limits.max_records {
            Some(CloseReason::Records)
        } else if batch.size_bytes() >= self.limits.max_bytes {
            Some(CloseReason::Bytes)
        } else {
            None
        };

        if let Some(reason) = reason {
            closed.extend(self.close(&key, reason, now));
        }
        Admission::Accepted(closed)
    }

    /// Closes every batch whose age reached the limit.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Batch> {
        let mut stale: Vec<PartitionKey> = self
            .slots
            .values()
            .filter(|b| self.is_stale(b, now))
            .map(|b| b.partition_key().clone())
            .collect();
        stale.sort();

        stale
            .iter()
            .filter_map(|key| self.close(key, CloseReason::Age, now))
            .collect()
    }

    /// Closes every open batch regardless of thresholds.
    pub fn drain(&mut self, now: DateTime<Utc>) -> Vec<Batch> {
        let mut keys: Vec<PartitionKey> = self.slots.keys().cloned().collect();
        keys.sort();

        keys.iter()
            .filter_map(|key| self.close(key, CloseReason::Drain, now))
            .collect()
    }

    fn is_stale(&self, batch: &Batch, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(batch.opened_at()) >= self.max_age
    }

    fn close(&mut self, key: &PartitionKey, reason: CloseReason, now: DateTime<Utc>) -> Option<Batch> {
        let mut batch = self.slots.remove(key)?;
        batch.mark_closing(reason);

        let seq = self.next_seq.entry(key.clone()).or_insert(0);
        let sealed = batch.seal(now, *seq);
        *seq += 1;

        debug!(
            batch_id = %sealed.id(),
            records = sealed.record_count(),
            bytes = sealed.size_bytes(),
            reason = %reason,
            "Closed batch"
        );
        Some(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use model::events::EventType;
    use std::{collections::BTreeMap, time::Duration};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn event(id: &str, key: &str) -> EnrichedEvent {
        EnrichedEvent {
            event_id: id.into(),
            event_type: EventType::PageView,
            timestamp: t0(),
            user_id: "u1".into(),
            session_id: "s1".into(),
            partition_key: PartitionKey::new(key),
            attributes: BTreeMap::new(),
            enrichment: BTreeMap::new(),
        }
    }

    fn windower(max_records: usize, max_bytes: usize, max_age_secs: u64) -> Windower {
        Windower::new(WindowLimits {
            max_records,
            max_bytes,
            max_age: Duration::from_secs(max_age_secs),
            ..WindowLimits::default()
        })
    }

    #[test]
    fn closes_exactly_at_record_limit() {
        let mut w = windower(3, usize::MAX, 60);
        assert!(w.admit(event("e1", "k"), t0()).closed().is_empty());
        assert!(w.admit(event("e2", "k"), t0()).closed().is_empty());
        assert_eq!(w.state_of(&PartitionKey::new("k")), Some(BatchState::Open));

        let closed = w.admit(event("e3", "k"), t0()).closed();
        assert_eq!(closed.len(), 1);
        let batch = &closed[0];
        assert_eq!(batch.state(), BatchState::Closed);
        assert_eq!(batch.close_reason(), Some(CloseReason::Records));
        assert_eq!(
            batch.events().iter().map(|e| e.event_id.as_str()).collect::<Vec<_>>(),
            vec!["e1", "e2", "e3"]
        );
        assert_eq!(w.state_of(&PartitionKey::new("k")), None);
    }

    #[test]
    fn closes_on_byte_limit() {
        let size = event("e1", "k").encoded_len();
        let mut w = windower(100, size * 2, 60);
        assert!(w.admit(event("e1", "k"), t0()).closed().is_empty());
        let closed = w.admit(event("e2", "k"), t0()).closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].close_reason(), Some(CloseReason::Bytes));
        assert_eq!(closed[0].size_bytes(), size * 2);
    }

    #[test]
    fn byte_limit_is_inclusive_of_the_reaching_event() {
        let size = event("e1", "k").encoded_len();
        let mut w = windower(100, size * 2 + 1, 60);
        assert!(w.admit(event("e1", "k"), t0()).closed().is_empty());
        assert!(w.admit(event("e2", "k"), t0()).closed().is_empty());
        assert_eq!(w.buffered_records(), 2);

        let closed = w.admit(event("e3", "k"), t0()).closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].record_count(), 3);
        assert_eq!(closed[0].close_reason(), Some(CloseReason::Bytes));
    }

    #[test]
    fn redelivered_event_ids_are_dropped() {
        let mut w = windower(100, usize::MAX, 60);
        assert!(!w.admit(event("e1", "k"), t0()).is_duplicate());
        assert!(w.admit(event("e1", "k"), t0()).is_duplicate());
        assert!(!w.admit(event("e2", "k"), t0()).is_duplicate());

        let closed = w.drain(t0());
        let ids: Vec<_> = closed[0].events().iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);

        // Still remembered after the batch holding it closed.
        assert!(w.admit(event("e1", "k"), t0()).is_duplicate());
        assert_eq!(w.open_batches(), 0);
    }

    #[test]
    fn tick_closes_only_aged_batches() {
        let mut w = windower(100, usize::MAX, 60);
        w.admit(event("e1", "old"), t0());
        w.admit(event("e2", "new"), t0() + TimeDelta::seconds(30));

        assert!(w.tick(t0() + TimeDelta::seconds(59)).is_empty());
        let closed = w.tick(t0() + TimeDelta::seconds(60));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].partition_key().as_str(), "old");
        assert_eq!(closed[0].close_reason(), Some(CloseReason::Age));
        assert_eq!(w.open_batches(), 1);
    }

    #[test]
    fn stale_batch_closes_before_accepting_new_event() {
        let mut w = windower(100, usize::MAX, 60);
        w.admit(event("e1", "k"), t0());

        let closed = w.admit(event("e2", "k"), t0() + TimeDelta::seconds(61)).closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].record_count(), 1);
        assert_eq!(closed[0].events()[0].event_id, "e1");
        assert_eq!(w.buffered_records(), 1);
    }

    #[test]
    fn close_sequence_is_monotonic_per_key() {
        let mut w = windower(1, usize::MAX, 60);
        let seqs: Vec<u64> = (0..3)
            .flat_map(|i| w.admit(event(&format!("e{i}"), "k"), t0()))
            .filter_map(|b| b.close_seq())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        let other = w.admit(event("x", "other"), t0()).closed();
        assert_eq!(other[0].close_seq(), Some(0));
    }

    #[test]
    fn drain_closes_everything_in_key_order() {
        let mut w = windower(100, usize::MAX, 60);
        w.admit(event("e1", "b"), t0());
        w.admit(event("e2", "a"), t0());

        let closed = w.drain(t0());
        let keys: Vec<_> = closed.iter().map(|b| b.partition_key().as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(closed.iter().all(|b| b.close_reason() == Some(CloseReason::Drain)));
        assert_eq!(w.open_batches(), 0);
        assert!(w.drain(t0()).is_empty());
    }
}
