//! Event Collector
//!
//! Client-side buffering and delivery of usage events. Events are appended to
//! an in-memory buffer and flushed to the ingest endpoint by a dual-threshold
//! send policy, with retry on failure and a fire-and-forget flush on unload.
//!
//! # Architecture
//!
//! - [`Collector`]: owns the buffer, the send-policy clock and the retry timer
//! - [`Delivery`]: delivery strategy seam ([`HttpDelivery`], [`BeaconDelivery`])
//! - [`PageContext`]: page URL and title captured with each event
//! - [`TrackedEvent`]: the captured event and its wire format
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tracker::collector::{Collector, StaticPage, Visibility};
//! use tracker::config::CollectorConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let page = Arc::new(StaticPage::new("https://example.com/", "Home"));
//! let collector = Collector::new(CollectorConfig::new("http://localhost:8001/track"), page)?;
//!
//! collector.track("view", &[]);
//! collector.track("scroll", &["footer"]);
//! collector.visibility_changed(Visibility::Hidden);
//! # Ok(())
//! # }
//! ```

mod engine;
mod event;
pub mod http;
mod page;
mod timer;
mod traits;

pub use engine::Collector;
pub use event::{TS_FORMAT, TrackedEvent};
pub use http::{BeaconDelivery, HttpDelivery};
pub use page::{PageContext, StaticPage, Visibility};
pub use timer::TimerState;
pub use traits::{
    CollectorError, DEFAULT_BATCH_SIZE, DEFAULT_RETRY_DELAY, DEFAULT_SEND_INTERVAL, Delivery,
    DeliveryError, DeliveryFuture, DeliveryOutcome, NAVIGATION_EVENT,
};
