//! Ingest-side parsing and validation of event batches.
//!
//! A batch is a JSON array sent either as `application/json` or as a
//! `text/plain` beacon. Elements that fail validation are dropped silently;
//! the rest become [`NewTrack`]s.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::storage::NewTrack;

/// Parse a request body into the elements of a JSON array.
///
/// Anything that is not a JSON array yields an empty batch.
pub fn parse_batch(body: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            tracing::debug!(kind = json_kind(&other), "Ignoring non-array body");
            Vec::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unparseable body");
            Vec::new()
        }
    }
}

/// Parse a capture timestamp into a calendar date.
///
/// Accepts RFC 3339, RFC 2822, a naive `YYYY-MM-DDTHH:MM:SS` (read as UTC)
/// and a bare `YYYY-MM-DD` (UTC midnight).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc().fixed_offset());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Validate one batch element.
///
/// Requires a non-empty `event`, an array `tags`, a non-empty `url` and
/// `title`, and a `ts` that parses as a date.
pub fn validate_event(value: &Value) -> Option<NewTrack> {
    let event = non_empty_str(value, "event")?;
    let tags = value.get("tags")?.as_array()?;
    let url = non_empty_str(value, "url")?;
    let title = non_empty_str(value, "title")?;
    let ts = value.get("ts")?.as_str()?;
    let captured_at = parse_timestamp(ts)?;

    Some(NewTrack {
        event: event.to_string(),
        tags: tags.clone(),
        url: url.to_string(),
        title: title.to_string(),
        ts: ts.to_string(),
        captured_at,
    })
}

/// Keep the valid elements of a batch, in order.
pub fn validate_batch(values: &[Value]) -> Vec<NewTrack> {
    let tracks: Vec<NewTrack> = values.iter().filter_map(validate_event).collect();
    let dropped = values.len() - tracks.len();
    if dropped > 0 {
        tracing::debug!(received = values.len(), dropped, "Dropped invalid events");
    }
    tracks
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
