//! Persistence gateway
//!
//! REST access to the trip server. Mutations are atomic per call and never
//! retried; read-only fetches retry transient failures.

pub mod client;
mod error;
mod http;

pub use client::TripGateway;
pub use error::GatewayError;
pub use http::HttpGateway;
