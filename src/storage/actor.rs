//! Writer actor with an MPSC command channel.
//!
//! Single-writer pattern: one Tokio task owns the write path and processes
//! commands in order. Tracks are buffered and flushed in one transaction when
//! the buffer reaches `batch_size` items or `flush_interval` has elapsed since
//! the first buffered item.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::types::NewTrack;

// =============================================================================
// Constants
// =============================================================================

/// Default maximum items in buffer before flush.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default maximum time before buffer flush.
pub const DEFAULT_BATCH_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Idle wake-up when nothing is buffered.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Commands
// =============================================================================

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// Buffer a batch of validated tracks.
    InsertTracks(Vec<NewTrack>),
    /// Delete tracks received more than `retention_days` ago.
    Cleanup {
        retention_days: u32,
        ack: oneshot::Sender<Result<u64, StorageError>>,
    },
    /// Force flush the buffer.
    Flush { ack: oneshot::Sender<()> },
    /// Flush and stop.
    Shutdown { ack: oneshot::Sender<()> },
}

// =============================================================================
// Buffer
// =============================================================================

/// Buffer for batch inserts with time-based and size-based flushing.
struct BatchBuffer<T> {
    items: Vec<T>,
    first_at: Instant,
    size_threshold: usize,
    time_threshold: Duration,
}

impl<T> BatchBuffer<T> {
    fn new(size_threshold: usize, time_threshold: Duration) -> Self {
        Self {
            items: Vec::with_capacity(size_threshold),
            first_at: Instant::now(),
            size_threshold,
            time_threshold,
        }
    }

    fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        // Start the clock on the first item so an idle buffer is never overdue
        if self.items.is_empty() {
            self.first_at = Instant::now();
        }
        self.items.extend(items);
    }

    fn deadline(&self) -> Option<Instant> {
        (!self.items.is_empty()).then(|| self.first_at + self.time_threshold)
    }

    fn should_flush(&self) -> bool {
        self.items.len() >= self.size_threshold
            || self.deadline().is_some_and(|d| Instant::now() >= d)
    }

    fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Database writer actor with batch buffering for tracks.
pub struct DbActor {
    pool: SqlitePool,
    rx: mpsc::Receiver<Command>,
    buffer: BatchBuffer<NewTrack>,
}

impl DbActor {
    /// Spawn the writer actor task.
    ///
    /// The schema must already be initialized on `pool`.
    pub fn spawn(
        pool: SqlitePool,
        channel_capacity: usize,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (JoinHandle<()>, mpsc::Sender<Command>) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let actor = DbActor {
            pool,
            rx,
            buffer: BatchBuffer::new(batch_size.max(1), flush_interval),
        };
        let handle = tokio::spawn(actor.run());
        (handle, tx)
    }

    async fn run(mut self) {
        tracing::info!("DbActor started");

        loop {
            let deadline = self
                .buffer
                .deadline()
                .unwrap_or_else(|| Instant::now() + IDLE_TIMEOUT);

            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await {
                            break;
                        }
                    }
                    None => {
                        tracing::warn!("Channel disconnected, shutting down");
                        self.flush().await;
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {}
            }

            if self.buffer.should_flush() {
                self.flush().await;
            }
        }

        tracing::info!("DbActor stopped");
    }

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::InsertTracks(tracks) => {
                self.buffer.extend(tracks);
            }
            Command::Cleanup {
                retention_days,
                ack,
            } => {
                let result = self.cleanup(retention_days).await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Cleanup tracks failed");
                }
                let _ = ack.send(result);
            }
            Command::Flush { ack } => {
                self.flush().await;
                let _ = ack.send(());
            }
            Command::Shutdown { ack } => {
                tracing::info!("DbActor shutting down");
                self.rx.close();
                self.flush().await;
                let _ = ack.send(());
                return true;
            }
        }
        false
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let count = self.buffer.len();
        let tracks = self.buffer.take();
        if let Err(e) = self.insert_tracks_batch(&tracks).await {
            tracing::error!(error = %e, count, "Tracks batch insert failed");
        }
    }

    // =========================================================================
    // Insert Operations
    // =========================================================================

    /// Insert tracks in a single transaction.
    async fn insert_tracks_batch(&self, tracks: &[NewTrack]) -> Result<(), StorageError> {
        let received_at_ms = Utc::now().timestamp_millis();
        let mut tx = self.pool.inner().begin().await?;

        for t in tracks {
            let tags_json = serde_json::to_string(&t.tags)?;
            sqlx::query(
                "INSERT INTO tracks (event, tags, url, title, ts, ts_epoch_ms, received_at_ms)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&t.event)
            .bind(tags_json)
            .bind(&t.url)
            .bind(&t.title)
            .bind(&t.ts)
            .bind(t.captured_at_ms())
            .bind(received_at_ms)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(count = tracks.len(), "Tracks batch inserted");
        Ok(())
    }

    // =========================================================================
    // Maintenance Operations
    // =========================================================================

    async fn cleanup(&mut self, retention_days: u32) -> Result<u64, StorageError> {
        self.flush().await;
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let deleted = sqlx::query("DELETE FROM tracks WHERE received_at_ms < ?")
            .bind(cutoff.timestamp_millis())
            .execute(self.pool.inner())
            .await?
            .rows_affected();
        tracing::info!(deleted, retention_days, "Tracks cleaned up");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::init_schema;
    use chrono::DateTime;
    use serde_json::json;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    async fn count(pool: &SqlitePool) -> i64 {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracks")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        n
    }

    fn track(event: &str) -> NewTrack {
        let ts = "2024-03-01T09:05:07+02:00";
        NewTrack {
            event: event.to_string(),
            tags: vec![json!("a"), json!(1)],
            url: "https://example.com/".to_string(),
            title: "Home".to_string(),
            ts: ts.to_string(),
            captured_at: DateTime::parse_from_rfc3339(ts).unwrap(),
        }
    }

    async fn flush(tx: &mpsc::Sender<Command>) {
        let (ack, done) = oneshot::channel();
        tx.send(Command::Flush { ack }).await.unwrap();
        done.await.unwrap();
    }

    async fn shutdown(tx: &mpsc::Sender<Command>, handle: JoinHandle<()>) {
        let (ack, done) = oneshot::channel();
        tx.send(Command::Shutdown { ack }).await.unwrap();
        done.await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_lifecycle() {
        let pool = memory_pool().await;
        let (handle, tx) = DbActor::spawn(pool, 100, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_FLUSH_INTERVAL);
        shutdown(&tx, handle).await;
    }

    #[tokio::test]
    async fn test_insert_with_flush() {
        let pool = memory_pool().await;
        let (handle, tx) =
            DbActor::spawn(pool.clone(), 100, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_FLUSH_INTERVAL);

        tx.send(Command::InsertTracks(vec![track("view"), track("scroll")]))
            .await
            .unwrap();
        flush(&tx).await;
        assert_eq!(count(&pool).await, 2);

        let (tags, ts, ts_epoch_ms): (String, String, i64) =
            sqlx::query_as("SELECT tags, ts, ts_epoch_ms FROM tracks WHERE event = 'view'")
                .fetch_one(pool.inner())
                .await
                .unwrap();
        assert_eq!(tags, r#"["a",1]"#);
        assert_eq!(ts, "2024-03-01T09:05:07+02:00");
        assert_eq!(ts_epoch_ms, 1_709_276_707_000);

        shutdown(&tx, handle).await;
    }

    #[tokio::test]
    async fn test_batch_threshold() {
        let pool = memory_pool().await;
        let (handle, tx) = DbActor::spawn(pool.clone(), 100, 3, Duration::from_secs(3600));

        tx.send(Command::InsertTracks(vec![track("a"), track("b")]))
            .await
            .unwrap();
        tx.send(Command::InsertTracks(vec![track("c")])).await.unwrap();

        for _ in 0..50 {
            if count(&pool).await == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(count(&pool).await, 3);

        shutdown(&tx, handle).await;
    }

    #[tokio::test]
    async fn test_time_based_flush() {
        let pool = memory_pool().await;
        let (handle, tx) = DbActor::spawn(pool.clone(), 100, 500, Duration::from_millis(100));

        tx.send(Command::InsertTracks(vec![track("view")]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(count(&pool).await, 1, "time-based flush should have written");

        shutdown(&tx, handle).await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_buffer() {
        let pool = memory_pool().await;
        let (handle, tx) = DbActor::spawn(pool.clone(), 100, 500, Duration::from_secs(3600));

        tx.send(Command::InsertTracks(vec![track("view")]))
            .await
            .unwrap();
        shutdown(&tx, handle).await;
        assert_eq!(count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_flushes_and_stops() {
        let pool = memory_pool().await;
        let (handle, tx) = DbActor::spawn(pool.clone(), 100, 500, Duration::from_secs(3600));

        tx.send(Command::InsertTracks(vec![track("view")]))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();
        assert_eq!(count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_cleanup() {
        let pool = memory_pool().await;
        let (handle, tx) = DbActor::spawn(pool.clone(), 100, 500, Duration::from_secs(3600));

        sqlx::query(
            "INSERT INTO tracks (event, tags, url, title, ts, ts_epoch_ms, received_at_ms)
             VALUES ('old', '[]', 'u', 't', '2000-01-01', 0, 0)",
        )
        .execute(pool.inner())
        .await
        .unwrap();
        tx.send(Command::InsertTracks(vec![track("fresh")]))
            .await
            .unwrap();

        let (ack, done) = oneshot::channel();
        tx.send(Command::Cleanup {
            retention_days: 1,
            ack,
        })
        .await
        .unwrap();
        assert_eq!(done.await.unwrap().unwrap(), 1);

        let (event,): (String,) = sqlx::query_as("SELECT event FROM tracks")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        assert_eq!(event, "fresh");

        shutdown(&tx, handle).await;
    }

    #[test]
    fn test_batch_buffer_deadline_only_when_filled() {
        let mut buffer: BatchBuffer<u8> = BatchBuffer::new(2, Duration::from_secs(1));
        assert!(buffer.deadline().is_none());
        assert!(!buffer.should_flush());

        buffer.extend([1]);
        assert!(buffer.deadline().is_some());
        assert!(!buffer.should_flush());

        buffer.extend([2]);
        assert!(buffer.should_flush());
        assert_eq!(buffer.take(), vec![1, 2]);
        assert!(buffer.deadline().is_none());
    }
}
