//! Language-model gateway.
//!
//! Wraps the upstream messages API behind two calls:
//! - [`GatewayClient::complete`]: one request, whole text back, with retries
//! - [`GatewayClient::stream`]: incremental text over a channel, never retried
//!
//! Credentials are resolved per request by [`Authenticator`].

mod auth;
mod client;
mod sse;
mod types;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use auth::{AuthHeader, Authenticator};
pub use client::{ChunkReceiver, GatewayClient};
pub use sse::{data_payload, decode_event, LineBuffer};
pub use types::*;
