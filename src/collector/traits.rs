//! Core collector traits and types.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::collector::TrackedEvent;

/// Number of buffered events that triggers an immediate send.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Minimum spacing between two normal-path sends.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(1);

/// Wait before retrying a failed batch.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Event name that signals the page is about to navigate away.
pub const NAVIGATION_EVENT: &str = "click-link";

/// Errors raised while constructing a collector.
///
/// Once built, a collector never surfaces errors to the host application.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Not called from within a Tokio runtime.
    #[error("no tokio runtime available: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Errors reported by a delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Connection, DNS or protocol failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The collector answered with something other than 200.
    #[error("unexpected status: {0}")]
    Status(u16),

    /// The batch could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of handing a batch to a [`Delivery`] strategy.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The receiving side confirmed the batch.
    Delivered,
    /// Handed off without confirmation (beacon path).
    Dispatched,
    /// The attempt failed and the batch must be retried.
    Failed(DeliveryError),
}

/// Future returned by [`Delivery::deliver`].
pub type DeliveryFuture = Pin<Box<dyn Future<Output = DeliveryOutcome> + Send + 'static>>;

/// A way of getting a batch of events to the remote collector.
///
/// `deliver` is called synchronously with the full batch; the returned future
/// performs the actual I/O and is driven by the collector's runtime.
///
/// Two strategies exist:
///
/// - [`HttpDelivery`](crate::collector::HttpDelivery): confirmed POST, used by
///   the buffered path. Failures are retried by the collector.
/// - [`BeaconDelivery`](crate::collector::BeaconDelivery): fire-and-forget,
///   used on unload. Its outcome is never observed.
pub trait Delivery: Send + Sync + 'static {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    /// Take ownership of `batch` and start delivering it.
    fn deliver(&self, batch: Vec<TrackedEvent>) -> DeliveryFuture;
}
