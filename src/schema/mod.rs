//! campus.telemetry.v1 schema
//!
//! This module defines the telemetry payload exchanged between building
//! gateways and the ingest service, together with its JSON and CBOR codecs.

mod adapter;
mod codec;
mod payload;

pub use adapter::*;
pub use codec::*;
pub use payload::*;
