//! Infrastructure adapters: the HTTP post store and process telemetry.

pub mod error;
pub mod http_store;
pub mod telemetry;
