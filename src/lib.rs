//! Smart Campus - air and water telemetry ingest and analytics
//!
//! Building gateways report one air node and one water node per payload,
//! encoded as JSON or CBOR. Each payload flows through a deterministic
//! pipeline: validation → quality control → risk indices → mold forecast →
//! alert rules → store.
//!
//! ## Modules
//!
//! - **Ingest**: [`IngestProcessor`] and the HTTP API in [`server`]
//! - **Analytics**: [`indices`], [`forecast`], [`quality`], [`alerts`]
//! - **Tooling**: synthetic [`generator`], offline [`dataset`] evaluation and
//!   the console [`monitor`]

pub mod alerts;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod forecast;
pub mod generator;
pub mod indices;
pub mod monitor;
pub mod physics;
pub mod pipeline;
pub mod quality;
pub mod schema;
pub mod server;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::Settings;
pub use error::TelemetryError;
pub use pipeline::IngestProcessor;
pub use server::ApiServer;
pub use store::TelemetryStore;

// Schema exports
pub use schema::{PayloadAdapter, PayloadCodec, Scenario, TelemetryPayload, SCHEMA_VERSION};

/// Crate version reported by `/health`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by `/health`
pub const PRODUCER_NAME: &str = "smart-campus";
