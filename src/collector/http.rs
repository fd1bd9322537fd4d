//! HTTP transports for delivering event batches.
//!
//! - [`HttpDelivery`]: confirmed POST, success is exactly status 200
//! - [`BeaconDelivery`]: fire-and-forget POST for the unload path

mod delivery;

pub use delivery::{BeaconDelivery, HttpDelivery, build_client};
