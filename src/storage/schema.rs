//! Database schema definitions.

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

/// SQL statement for creating the tracks table.
///
/// `ts` keeps the capture time exactly as the client sent it; `ts_epoch_ms`
/// is its parsed form, used for range filters. `tags` is a JSON array.
pub const TRACKS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS tracks (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    event          TEXT NOT NULL,
    tags           TEXT NOT NULL DEFAULT '[]',
    url            TEXT NOT NULL,
    title          TEXT NOT NULL,
    ts             TEXT NOT NULL,
    ts_epoch_ms    INTEGER NOT NULL,
    received_at_ms INTEGER NOT NULL
);
"#;

/// Indexes backing the reader queries.
pub const TRACKS_INDEXES_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tracks_received_at ON tracks (received_at_ms);
CREATE INDEX IF NOT EXISTS idx_tracks_event_received_at ON tracks (event, received_at_ms);
"#;

/// Initialize the database schema.
///
/// Creates all necessary tables and indexes if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::raw_sql(TRACKS_TABLE_DDL).execute(pool.inner()).await?;
    sqlx::raw_sql(TRACKS_INDEXES_DDL).execute(pool.inner()).await?;

    tracing::info!("Database schema initialized");
    Ok(())
}
