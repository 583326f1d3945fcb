pub mod health;
pub use self::health::health;

pub mod public_keys;
pub use self::public_keys::public_keys;

pub mod get_secret;
pub use self::get_secret::get_secret;

pub mod add_key;
pub use self::add_key::add_key;

// common types and helpers for the handlers
use crate::relay::{
    error::Error,
    rate_limit::{Decision, Endpoint, FixedWindowLimiter},
};
use axum::{extract::ConnectInfo, http::HeaderMap};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::debug;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Message {
    pub message: String,
}

/// Shared limiter plus the header carrying the client IP behind a proxy.
#[derive(Clone, Debug)]
pub struct RateLimit {
    pub limiter: Arc<FixedWindowLimiter>,
    pub ip_header: String,
}

/// Client identity for rate limiting: first hop of the configured forwarded
/// header, falling back to the socket peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<&SocketAddr>, ip_header: &str) -> String {
    headers
        .get(ip_header)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Fail fast with `RateLimited` before any store access.
pub(crate) fn enforce(
    limit: &RateLimit,
    endpoint: Endpoint,
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
) -> Result<(), Error> {
    let client = client_ip(headers, peer.map(|info| &info.0), &limit.ip_header);

    match limit.limiter.check(&client, endpoint) {
        Decision::Allowed => Ok(()),
        Decision::Limited => {
            debug!(client, ?endpoint, "Request rate limited");
            Err(Error::RateLimited)
        }
    }
}
