//! HTTP delivery strategies.
//!
//! Both strategies POST the JSON array of events to the collector endpoint.
//! They differ in what they wait for.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::collector::{
    CollectorError, Delivery, DeliveryError, DeliveryFuture, DeliveryOutcome, TrackedEvent,
};

/// The only status that counts as a successful delivery.
const SUCCESS_STATUS: u16 = 200;

/// Content type of a beacon carrying a string payload.
const BEACON_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// Build the shared HTTP client.
///
/// # Errors
/// Returns `CollectorError::Config` if the client cannot be built.
pub fn build_client(request_timeout: Option<Duration>) -> Result<Client, CollectorError> {
    let mut builder = Client::builder();
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| CollectorError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Confirmed POST used by the buffered path.
///
/// Resolves to `Delivered` on status 200 and `Failed` on anything else.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: Client,
    endpoint: String,
}

impl HttpDelivery {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl Delivery for HttpDelivery {
    fn name(&self) -> &'static str {
        "http"
    }

    fn deliver(&self, batch: Vec<TrackedEvent>) -> DeliveryFuture {
        let count = batch.len();
        let body = match serde_json::to_vec(&batch) {
            Ok(body) => body,
            Err(e) => return Box::pin(async move { DeliveryOutcome::Failed(e.into()) }),
        };

        let request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let endpoint = self.endpoint.clone();

        Box::pin(async move {
            match request.send().await {
                Ok(response) if response.status().as_u16() == SUCCESS_STATUS => {
                    tracing::debug!(endpoint = %endpoint, count, "Batch delivered");
                    DeliveryOutcome::Delivered
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    tracing::warn!(
                        endpoint = %endpoint,
                        count,
                        status,
                        "Batch rejected by collector"
                    );
                    DeliveryOutcome::Failed(DeliveryError::Status(status))
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, count, error = %e, "Batch delivery failed");
                    DeliveryOutcome::Failed(DeliveryError::Transport(e))
                }
            }
        })
    }
}

/// Fire-and-forget POST used on unload.
///
/// The response is never inspected; the future resolves to `Dispatched`
/// once the request has been attempted.
#[derive(Debug, Clone)]
pub struct BeaconDelivery {
    client: Client,
    endpoint: String,
}

impl BeaconDelivery {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl Delivery for BeaconDelivery {
    fn name(&self) -> &'static str {
        "beacon"
    }

    fn deliver(&self, batch: Vec<TrackedEvent>) -> DeliveryFuture {
        let count = batch.len();
        let body = match serde_json::to_string(&batch) {
            Ok(body) => body,
            Err(e) => return Box::pin(async move { DeliveryOutcome::Failed(e.into()) }),
        };

        let request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, BEACON_CONTENT_TYPE)
            .body(body);

        Box::pin(async move {
            if let Err(e) = request.send().await {
                tracing::debug!(count, error = %e, "Beacon not sent");
            }
            DeliveryOutcome::Dispatched
        })
    }
}
