//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::storage::StorageError;
use crate::storage::actor::{DEFAULT_BATCH_FLUSH_INTERVAL, DEFAULT_BATCH_SIZE, DbActor};
use crate::storage::db::SqlitePool;
use crate::storage::schema::init_schema;
use crate::storage::{StorageAdmin, TrackReader, TrackWriter};

/// Default channel capacity for writer commands.
///
/// Each command carries one ingested batch, so this bounds the number of
/// batches waiting for the actor.
const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Default number of connection attempts on startup.
const DEFAULT_CONNECT_RETRIES: u32 = 10;

/// Delay between connection attempts.
const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    url: String,
    channel_capacity: usize,
    batch_size: usize,
    batch_flush_interval: Duration,
    connect_retries: u32,
    connect_retry_delay: Duration,
}

impl StorageBuilder {
    /// Create a new storage builder for a sqlx SQLite URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_flush_interval: DEFAULT_BATCH_FLUSH_INTERVAL,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
        }
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the batch size for track buffering.
    ///
    /// The actor will flush buffered tracks when this threshold is reached.
    /// Default: 500 items.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the batch flush interval for track buffering.
    ///
    /// The actor will flush buffered tracks after this duration, even if
    /// the batch size threshold hasn't been reached. Default: 1 second.
    pub fn batch_flush_interval(mut self, interval: Duration) -> Self {
        self.batch_flush_interval = interval;
        self
    }

    /// Set the number of connection attempts. Default: 10.
    pub fn connect_retries(mut self, attempts: u32) -> Self {
        self.connect_retries = attempts;
        self
    }

    /// Set the delay between connection attempts. Default: 1 second.
    pub fn connect_retry_delay(mut self, delay: Duration) -> Self {
        self.connect_retry_delay = delay;
        self
    }

    /// Build the storage layer and return handles.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        // Create parent directory if it doesn't exist
        if let Some(path) = database_file(&self.url)
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Internal(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let pool = SqlitePool::connect_with_retry(
            &self.url,
            self.connect_retries,
            self.connect_retry_delay,
        )
        .await?;
        init_schema(&pool).await?;

        let (actor_handle, tx) = DbActor::spawn(
            pool.clone(),
            self.channel_capacity,
            self.batch_size,
            self.batch_flush_interval,
        );

        Ok(StorageHandles {
            writer: TrackWriter::new(tx.clone()),
            reader: TrackReader::new(pool.clone()),
            admin: StorageAdmin::new(tx),
            pool,
            actor_handle: Some(actor_handle),
        })
    }
}

/// Filesystem path of a file-backed SQLite URL.
fn database_file(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" || url.contains("mode=memory") {
        return None;
    }
    Some(Path::new(path))
}

/// Handles to all storage layer facades.
pub struct StorageHandles {
    /// Writer facade for validated tracks.
    pub writer: TrackWriter,
    /// Facade for reading tracks and stats.
    pub reader: TrackReader,
    /// Facade for storage administration.
    pub admin: StorageAdmin,
    pool: SqlitePool,
    /// Internal actor handle for graceful shutdown.
    actor_handle: Option<JoinHandle<()>>,
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Flushes buffered tracks, stops the writer actor and closes the pool.
    pub async fn shutdown(mut self) -> Result<(), StorageError> {
        self.admin.shutdown().await?;

        if let Some(handle) = self.actor_handle.take() {
            handle
                .await
                .map_err(|e| StorageError::Internal(format!("Failed to join actor task: {e}")))?;
        }
        self.pool.close().await;

        Ok(())
    }
}

impl Drop for StorageHandles {
    fn drop(&mut self) {
        // Best effort: ask the actor to flush and stop without waiting
        if self.actor_handle.take().is_some() {
            let _ = self.admin.try_shutdown();
        }
    }
}
