//! Network layer for Recplay
//!
//! Hyper server for the control routes and proxied traffic, plus the
//! pooled client record mode forwards through.

mod client;
mod http;
mod routes;
mod server;

pub use client::{HttpClient, Upstream, UpstreamRequest};
pub use http::{
    empty_response, error_response, from_proxy_response, headers_from_map, into_proxy_request,
    json_response, read_body, validate_request,
};
pub use routes::route;
pub use server::ProxyServer;

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
