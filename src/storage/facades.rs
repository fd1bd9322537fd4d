//! User-facing storage facades.
//!
//! Provides ergonomic APIs for storage operations:
//! - `TrackWriter`: Non-blocking writes via MPSC
//! - `TrackReader`: Query stored tracks and per-event counts
//! - `StorageAdmin`: Cleanup and shutdown

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::sync::{mpsc, oneshot};

use crate::storage::StorageError;
use crate::storage::actor::Command;
use crate::storage::db::SqlitePool;
use crate::storage::types::{EventCount, NewTrack, Track};

// =============================================================================
// Constants
// =============================================================================

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 10_000;
const DEFAULT_RANGE_DAYS: i64 = 30;

// =============================================================================
// Query Types
// =============================================================================

/// Sort order for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Query for stored tracks.
///
/// The time range applies to the server receive time.
#[derive(Debug, Clone, Default)]
pub struct TrackQuery {
    pub event: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub order: Option<SortOrder>,
}

fn resolve_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    let start = start.unwrap_or_else(|| now - Duration::days(DEFAULT_RANGE_DAYS));
    (start, end.unwrap_or(now))
}

// =============================================================================
// Writer
// =============================================================================

/// Non-blocking track writer.
///
/// Uses `try_send`: a batch is refused if the channel is full or closed.
/// Accepted tracks are buffered by the actor until a flush threshold.
#[derive(Clone)]
pub struct TrackWriter {
    tx: mpsc::Sender<Command>,
    dropped_tracks: Arc<AtomicU64>,
}

impl std::fmt::Debug for TrackWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackWriter").finish_non_exhaustive()
    }
}

impl TrackWriter {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self {
            tx,
            dropped_tracks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total count of tracks refused due to channel capacity or shutdown.
    pub fn dropped_tracks(&self) -> u64 {
        self.dropped_tracks.load(Ordering::Relaxed)
    }

    /// Queue a batch of tracks. An empty batch is a no-op.
    pub fn insert_tracks(&self, tracks: Vec<NewTrack>) -> Result<(), StorageError> {
        if tracks.is_empty() {
            return Ok(());
        }
        let count = tracks.len() as u64;
        if self.tx.try_send(Command::InsertTracks(tracks)).is_err() {
            tracing::warn!(count, "Channel full or closed, dropping tracks");
            self.dropped_tracks.fetch_add(count, Ordering::Relaxed);
            return Err(StorageError::ChannelSend);
        }
        Ok(())
    }

    /// Force the actor to write its buffer and wait until it has.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Flush { ack })
            .await
            .map_err(|_| StorageError::ChannelSend)?;
        done.await
            .map_err(|_| StorageError::Internal("flush acknowledgement dropped".to_string()))
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Track reader.
#[derive(Clone)]
pub struct TrackReader {
    pool: SqlitePool,
}

impl std::fmt::Debug for TrackReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackReader").finish_non_exhaustive()
    }
}

impl TrackReader {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Query tracks with filters.
    pub async fn query(&self, q: TrackQuery) -> Result<Vec<Track>, StorageError> {
        let (start, end) = resolve_range(q.start, q.end);
        let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let order = q.order.unwrap_or_default();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, event, tags, url, title, ts, received_at_ms FROM tracks WHERE received_at_ms >= ",
        );
        qb.push_bind(start.timestamp_millis());
        qb.push(" AND received_at_ms <= ");
        qb.push_bind(end.timestamp_millis());

        if let Some(event) = q.event {
            qb.push(" AND event = ");
            qb.push_bind(event);
        }

        qb.push(format!(
            " ORDER BY received_at_ms {order}, id {order} LIMIT ",
            order = order.as_sql()
        ));
        qb.push_bind(i64::from(limit));

        let rows = qb.build().fetch_all(self.pool.inner()).await?;
        rows.iter()
            .map(|row| -> Result<Track, StorageError> {
                let received_at_ms: i64 = row.try_get("received_at_ms")?;
                Ok(Track {
                    id: row.try_get("id")?,
                    event: row.try_get("event")?,
                    tags: parse_tags(&row.try_get::<String, _>("tags")?),
                    url: row.try_get("url")?,
                    title: row.try_get("title")?,
                    ts: row.try_get("ts")?,
                    received_at: DateTime::from_timestamp_millis(received_at_ms).ok_or_else(
                        || StorageError::InvalidData(format!("received_at_ms {received_at_ms}")),
                    )?,
                })
            })
            .collect()
    }

    /// Per-event counts within a receive-time range, most frequent first.
    pub async fn stats(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventCount>, StorageError> {
        let (start, end) = resolve_range(start, end);
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT event, COUNT(*) AS count FROM tracks
             WHERE received_at_ms >= ? AND received_at_ms <= ?
             GROUP BY event ORDER BY count DESC, event ASC",
        )
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all(self.pool.inner())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(event, count)| EventCount { event, count })
            .collect())
    }

    /// Check that the database answers.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(self.pool.inner()).await?;
        Ok(())
    }
}

// =============================================================================
// Admin
// =============================================================================

/// Storage administration.
#[derive(Clone)]
pub struct StorageAdmin {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for StorageAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdmin").finish_non_exhaustive()
    }
}

impl StorageAdmin {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Delete tracks received more than `retention_days` ago.
    ///
    /// Returns the number of deleted rows.
    pub async fn cleanup(&self, retention_days: u32) -> Result<u64, StorageError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Cleanup {
                retention_days,
                ack,
            })
            .await
            .map_err(|_| StorageError::ChannelSend)?;
        done.await
            .map_err(|_| StorageError::Internal("cleanup acknowledgement dropped".to_string()))?
    }

    /// Flush the buffer and stop the writer actor.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Shutdown { ack })
            .await
            .map_err(|_| StorageError::ChannelSend)?;
        done.await
            .map_err(|_| StorageError::Internal("shutdown acknowledgement dropped".to_string()))
    }

    /// Request shutdown without waiting for the actor.
    pub(crate) fn try_shutdown(&self) -> Result<(), StorageError> {
        let (ack, _) = oneshot::channel();
        self.tx
            .try_send(Command::Shutdown { ack })
            .map_err(|_| StorageError::ChannelSend)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Parse a stored JSON tag array.
fn parse_tags(s: &str) -> Vec<Value> {
    serde_json::from_str(s).unwrap_or_else(|e| {
        tracing::debug!(error = %e, raw = s, "Failed to parse tags, returning empty");
        Vec::new()
    })
}
