//! Tibber GraphQL API integration
//!
//! Wire types, query documents, and the HTTPS client used for price,
//! consumption, home-metadata, and push-notification operations. The live
//! measurement subscription rides over WebSocket and lives in [`crate::live`].

pub mod client;
pub mod queries;
pub mod types;

// Re-exports for the public API surface
pub use client::ApiClient;
pub use types::{
    ConsumptionData, ConsumptionNode, Home, LiveMeasurement, PriceEntry, PriceInfo, PriceLevel,
    PushResult,
};
