use crate::{core::identifiers::PartitionKey, events::EventType};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// How the partition key is derived from a validated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionRule {
    /// `year=YYYY/month=MM/day=DD`
    Daily,
    /// `event_type=<type>/year=YYYY/month=MM/day=DD`
    #[default]
    DailyByType,
    /// `year=YYYY/month=MM/day=DD/hour=HH`
    Hourly,
    /// `event_type=<type>/year=YYYY/month=MM/day=DD/hour=HH`
    HourlyByType,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown partition rule '{0}' (expected daily, daily_by_type, hourly, hourly_by_type)")]
pub struct UnknownPartitionRule(pub String);

impl PartitionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionRule::Daily => "daily",
            PartitionRule::DailyByType => "daily_by_type",
            PartitionRule::Hourly => "hourly",
            PartitionRule::HourlyByType => "hourly_by_type",
        }
    }

    /// Derives the key from the event type and its normalized timestamp.
    /// Only these two inputs are read, so the key is stable across runs.
    pub fn derive(&self, event_type: EventType, ts: &DateTime<Utc>) -> PartitionKey {
        let date = format!(
            "year={:04}/month={:02}/day={:02}",
            ts.year(),
            ts.month(),
            ts.day()
        );

        let key = match self {
            PartitionRule::Daily => date,
            PartitionRule::DailyByType => format!("event_type={}/{date}", event_type.as_str()),
            PartitionRule::Hourly => format!("{date}/hour={:02}", ts.hour()),
            PartitionRule::HourlyByType => format!(
                "event_type={}/{date}/hour={:02}",
                event_type.as_str(),
                ts.hour()
            ),
        };

        PartitionKey::new(key)
    }
}

impl fmt::Display for PartitionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionRule {
    type Err = UnknownPartitionRule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(PartitionRule::Daily),
            "daily_by_type" => Ok(PartitionRule::DailyByType),
            "hourly" => Ok(PartitionRule::Hourly),
            "hourly_by_type" => Ok(PartitionRule::HourlyByType),
            other => Err(UnknownPartitionRule(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_by_type_layout() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 14, 5, 0).unwrap();
        let key = PartitionRule::DailyByType.derive(EventType::Purchase, &ts);
        assert_eq!(key.as_str(), "event_type=purchase/year=2026/month=03/day=07");
    }

    #[test]
    fn hourly_adds_hour_segment() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 4, 59, 59).unwrap();
        let key = PartitionRule::Hourly.derive(EventType::PageView, &ts);
        assert_eq!(key.as_str(), "year=2026/month=03/day=07/hour=04");
    }

    #[test]
    fn parses_rule_names() {
        assert_eq!("Hourly_By_Type".parse(), Ok(PartitionRule::HourlyByType));
        assert!("weekly".parse::<PartitionRule>().is_err());
    }
}
