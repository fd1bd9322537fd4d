//! Tracked event value type and its wire format.

use chrono::{DateTime, FixedOffset, Local, SubsecRound};
use serde::{Deserialize, Serialize};

/// Timestamp layout on the wire: RFC 3339, second precision, numeric offset.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// A captured user interaction, immutable once created.
///
/// Serializes to the collector wire format:
///
/// ```json
/// { "event": "view", "tags": ["hero"], "url": "https://example.com/",
///   "title": "Home", "ts": "2024-03-01T12:30:05+02:00" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEvent {
    /// Event type identifier (e.g. "click-link").
    pub event: String,
    /// Auxiliary labels, in call order.
    pub tags: Vec<String>,
    /// Page address at capture time.
    pub url: String,
    /// Page title at capture time.
    pub title: String,
    /// Capture instant in the host's local offset.
    #[serde(rename = "ts", with = "ts_format")]
    pub timestamp: DateTime<FixedOffset>,
}

impl TrackedEvent {
    /// Capture an event now, in the local timezone.
    pub fn capture(
        event: impl Into<String>,
        tags: Vec<String>,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self::at(event, tags, url, title, Local::now().fixed_offset())
    }

    /// Build an event with an explicit capture instant.
    ///
    /// Sub-second precision is dropped to match the wire format.
    pub fn at(
        event: impl Into<String>,
        tags: Vec<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            event: event.into(),
            tags,
            url: url.into(),
            title: title.into(),
            timestamp: timestamp.trunc_subsecs(0),
        }
    }

    /// The `ts` field as it appears on the wire.
    pub fn ts(&self) -> String {
        self.timestamp.format(TS_FORMAT).to_string()
    }
}

mod ts_format {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TS_FORMAT;

    pub fn serialize<S>(ts: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&ts.format(TS_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_at(offset_secs: i32) -> TrackedEvent {
        let tz = FixedOffset::east_opt(offset_secs).unwrap();
        let ts = tz.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        TrackedEvent::at(
            "view",
            vec!["hero".to_string()],
            "https://example.com/",
            "Home",
            ts,
        )
    }

    #[test]
    fn test_wire_format_fields() {
        let value = serde_json::to_value(event_at(2 * 3600)).unwrap();
        assert_eq!(value["event"], "view");
        assert_eq!(value["tags"], serde_json::json!(["hero"]));
        assert_eq!(value["url"], "https://example.com/");
        assert_eq!(value["title"], "Home");
        assert_eq!(value["ts"], "2024-03-01T09:05:07+02:00");
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn test_utc_uses_numeric_offset() {
        assert_eq!(event_at(0).ts(), "2024-03-01T09:05:07+00:00");
    }

    #[test]
    fn test_negative_offset_with_minutes() {
        // -03:30 (Newfoundland)
        assert_eq!(
            event_at(-(3 * 3600 + 30 * 60)).ts(),
            "2024-03-01T09:05:07-03:30"
        );
    }

    #[test]
    fn test_ts_roundtrip_preserves_instant_and_offset() {
        let original = event_at(-5 * 3600);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: TrackedEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.timestamp, original.timestamp);
        assert_eq!(parsed.timestamp.offset().local_minus_utc(), -5 * 3600);
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_capture_truncates_subseconds() {
        let event = TrackedEvent::capture("scroll", vec![], "https://example.com/", "Home");
        assert_eq!(event.timestamp.timestamp_subsec_nanos(), 0);

        let reparsed = DateTime::parse_from_rfc3339(&event.ts()).unwrap();
        assert_eq!(reparsed, event.timestamp);
    }
}
