use crate::error::ValidationError;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use engine_config::settings::SkewBounds;
use engine_core::clock::Clock;
use model::{
    core::value::Value,
    events::{EventType, ValidatedEvent},
    records::raw::RawRecord,
};
use serde_json::{Map, Value as Json};
use std::{collections::BTreeMap, sync::Arc};

/// Envelope fields with the legacy producer alias each one accepts.
const ENVELOPE: [(&str, Option<&str>); 6] = [
    ("id", Some("event_id")),
    ("type", Some("event_type")),
    ("ts", Some("timestamp")),
    ("user_id", None),
    ("session_id", None),
    ("attrs", None),
];

/// Checks raw payloads against the event envelope and attribute schema.
///
/// Required fields are checked in declaration order and the first failing
/// one is reported. Timestamp skew is checked against the injected clock
/// once the envelope is well formed.
pub struct EventValidator {
    clock: Arc<dyn Clock>,
    max_past: ChronoDuration,
    max_future: ChronoDuration,
}

impl EventValidator {
    pub fn new(skew: SkewBounds, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            max_past: ChronoDuration::from_std(skew.max_past).unwrap_or(ChronoDuration::MAX),
            max_future: ChronoDuration::from_std(skew.max_future).unwrap_or(ChronoDuration::MAX),
        }
    }

    pub fn validate(&self, raw: &RawRecord) -> Result<ValidatedEvent, ValidationError> {
        let parsed: Json = serde_json::from_str(&raw.payload)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;
        let Json::Object(obj) = parsed else {
            return Err(ValidationError::MalformedPayload(
                "payload is not a JSON object".into(),
            ));
        };

        let event_id = required_string(&obj, "id")?;

        let event_type = required_string(&obj, "type")?
            .parse::<EventType>()
            .map_err(|e| ValidationError::schema("type", e))?;

        let timestamp = match field(&obj, "ts") {
            None => return Err(ValidationError::schema("ts", "missing")),
            Some(v) => parse_timestamp(v)?,
        };

        let user_id = required_string(&obj, "user_id")?;

        let session_id = match field(&obj, "session_id") {
            None => None,
            Some(Json::String(s)) if s.trim().is_empty() => None,
            Some(Json::String(s)) => Some(s.clone()),
            Some(_) => return Err(ValidationError::schema("session_id", "must be a string")),
        };

        let mut attributes = match field(&obj, "attrs") {
            None => BTreeMap::new(),
            Some(Json::Object(map)) => {
                convert_map(map).map_err(|path| ValidationError::schema("attrs", path))?
            }
            Some(_) => return Err(ValidationError::schema("attrs", "must be an object")),
        };

        for (key, value) in obj.iter().filter(|(k, _)| !is_envelope_key(k)) {
            if attributes.contains_key(key) {
                continue;
            }
            let converted = convert(value)
                .map_err(|path| ValidationError::schema(key, format!("{key}{path}")))?;
            attributes.insert(key.clone(), converted);
        }

        self.check_skew(timestamp)?;

        Ok(ValidatedEvent {
            event_id,
            event_type,
            timestamp,
            user_id,
            session_id,
            attributes,
            source_key: raw.source_key.clone(),
        })
    }

    fn check_skew(&self, ts: DateTime<Utc>) -> Result<(), ValidationError> {
        let now = self.clock.now();
        let earliest = now.checked_sub_signed(self.max_past).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let latest = now.checked_add_signed(self.max_future).unwrap_or(DateTime::<Utc>::MAX_UTC);

        if ts < earliest || ts > latest {
            return Err(ValidationError::TimestampOutOfRange {
                ts,
                earliest,
                latest,
            });
        }
        Ok(())
    }
}

fn is_envelope_key(key: &str) -> bool {
    ENVELOPE
        .iter()
        .any(|(name, alias)| *name == key || *alias == Some(key))
}

/// Looks up a canonical field, falling back to its alias. JSON `null` counts
/// as absent.
fn field<'a>(obj: &'a Map<String, Json>, name: &str) -> Option<&'a Json> {
    let alias = ENVELOPE
        .iter()
        .find(|(n, _)| *n == name)
        .and_then(|(_, a)| *a);

    obj.get(name)
        .filter(|v| !v.is_null())
        .or_else(|| alias.and_then(|a| obj.get(a)).filter(|v| !v.is_null()))
}

fn required_string(obj: &Map<String, Json>, name: &str) -> Result<String, ValidationError> {
    match field(obj, name) {
        None => Err(ValidationError::schema(name, "missing")),
        Some(Json::String(s)) if s.trim().is_empty() => {
            Err(ValidationError::schema(name, "must not be empty"))
        }
        Some(Json::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::schema(name, "must be a string")),
    }
}

fn parse_timestamp(value: &Json) -> Result<DateTime<Utc>, ValidationError> {
    match value {
        Json::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| ValidationError::schema("ts", format!("not RFC 3339: {e}"))),
        Json::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| ValidationError::schema("ts", "epoch millis out of range")),
        _ => Err(ValidationError::schema(
            "ts",
            "must be an RFC 3339 string or epoch millis",
        )),
    }
}

/// Converts a JSON value into an attribute value. Arrays are rejected; the
/// error carries the dotted path to the offending element.
fn convert(value: &Json) -> Result<Value, String> {
    Ok(match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(_) => return Err(": arrays are not allowed".to_string()),
        Json::Object(map) => Value::Map(convert_map(map)?),
    })
}

fn convert_map(map: &Map<String, Json>) -> Result<BTreeMap<String, Value>, String> {
    map.iter()
        .map(|(k, v)| {
            convert(v)
                .map(|v| (k.clone(), v))
                .map_err(|path| format!(".{k}{path}"))
        })
        .collect()
}
