//! Storage Layer
//!
//! SQLite storage with async read/write separation:
//! - **Writer**: Tokio task with exclusive writes fed by a bounded mpsc channel
//! - **Reader**: sqlx connection pool for concurrent reads
//!
//! # Components
//!
//! - [`TrackWriter`]: Non-blocking write facade for validated tracks
//! - [`TrackReader`]: Async read facade (tracks, per-event stats, readiness)
//! - [`StorageAdmin`]: Cleanup and shutdown
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management

mod actor;
mod builder;
pub mod db;
mod error;
mod facades;
mod schema;
mod types;

pub use actor::{DEFAULT_BATCH_FLUSH_INTERVAL, DEFAULT_BATCH_SIZE};
pub use builder::{StorageBuilder, StorageHandles};
pub use error::StorageError;
pub use facades::{SortOrder, StorageAdmin, TrackQuery, TrackReader, TrackWriter};
pub use types::{EventCount, NewTrack, Track};
