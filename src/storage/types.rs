//! Core data types for the storage layer.
//!
//! - [`NewTrack`]: a validated event on its way into the `tracks` table
//! - [`Track`]: a stored event as returned by readers
//! - [`EventCount`]: per-event aggregate for stats

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validated event ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrack {
    /// Event type identifier.
    pub event: String,
    /// Tags exactly as received.
    pub tags: Vec<Value>,
    /// Page address at capture time.
    pub url: String,
    /// Page title at capture time.
    pub title: String,
    /// Capture time as sent by the client.
    pub ts: String,
    /// Capture time parsed from `ts`.
    pub captured_at: DateTime<FixedOffset>,
}

impl NewTrack {
    /// Capture time in Unix milliseconds.
    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at.timestamp_millis()
    }
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Row identifier.
    pub id: i64,
    /// Event type identifier.
    pub event: String,
    /// Tags exactly as received.
    pub tags: Vec<Value>,
    /// Page address at capture time.
    pub url: String,
    /// Page title at capture time.
    pub title: String,
    /// Capture time as sent by the client.
    pub ts: String,
    /// Server receive time (UTC).
    pub received_at: DateTime<Utc>,
}

/// Number of stored tracks for one event name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCount {
    pub event: String,
    pub count: i64,
}
