//! Tracker - Usage Event Collection
//!
//! This crate provides a client-side usage-event collector and the ingest
//! server that receives its batches. It can be used as a library, or run as
//! a standalone binary with the `tracker` executable.
//!
//! # Architecture
//!
//! - **Collector**: Buffers events and delivers them under a dual-threshold
//!   send policy, with retry on failure and a beacon flush on unload
//! - **Ingest**: Parses and validates received batches
//! - **Storage**: SQLite persistence through a single writer actor
//! - **Server**: `POST /track` plus health and read-back endpoints
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tracker::{Collector, CollectorConfig, StaticPage, StorageBuilder};
//! use tracker::server::{AppState, create_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = StorageBuilder::new("sqlite:tracker.db?mode=rwc").build().await?;
//!     let app = create_router(AppState {
//!         writer: storage.writer.clone(),
//!         reader: storage.reader.clone(),
//!     });
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8001").await?;
//!     tokio::spawn(async move { axum::serve(listener, app).await });
//!
//!     let page = Arc::new(StaticPage::new("https://example.com/", "Home"));
//!     let collector = Collector::new(CollectorConfig::new("http://127.0.0.1:8001/track"), page)?;
//!     collector.track("view", &[]);
//!
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod ingest;
pub mod server;
pub mod storage;

pub use collector::{
    BeaconDelivery, Collector, CollectorError, Delivery, DeliveryError, DeliveryOutcome,
    HttpDelivery, PageContext, StaticPage, TrackedEvent, Visibility,
};
pub use config::{AppConfig, CollectorConfig, ConfigError};
pub use storage::{
    NewTrack, StorageBuilder, StorageError, StorageHandles, Track, TrackReader, TrackWriter,
};
