//! # Helios - Tibber energy price and live consumption monitor
//!
//! A Rust implementation of a Tibber-connected energy monitor: it caches
//! hourly electricity prices with a publish-time-aware refresh schedule,
//! answers the comparator questions used to drive automations ("is this
//! hour among the N cheapest today?"), and keeps a resilient live
//! power-measurement stream open with watchdog-based resubscription.
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `clock`: Timezone-aware day-boundary and wall-clock helpers
//! - `settings`: Key-value settings store (token, watermarks)
//! - `tibber`: GraphQL API types, queries, and HTTPS client
//! - `prices`: Hourly price cache and refresh scheduler
//! - `comparators`: Pure price comparison predicates
//! - `live`: Live measurement subscription manager

pub mod clock;
pub mod comparators;
pub mod config;
pub mod error;
pub mod live;
pub mod logging;
pub mod prices;
pub mod settings;
pub mod tibber;

// Re-export commonly used types
pub use config::Config;
pub use error::{HeliosError, Result};
pub use live::{LiveFeed, LiveStreamManager};
pub use prices::{PriceCache, PriceFeed, PriceSnapshot};
pub use tibber::{ApiClient, LiveMeasurement, PriceEntry, PriceLevel};
