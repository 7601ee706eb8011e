use hyper::{HeaderMap, Method, StatusCode, header::{HeaderName, HeaderValue}};
use std::fmt;
use std::time::Instant;
use warp::log::{Info, Log};

use crate::config::CACHE_HEADER;

#[cfg(test)]
mod tests;

/// Tags a response as served from the offline cache.
pub fn mark_cache_hit(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static(CACHE_HEADER),
        HeaderValue::from_static("hit"),
    );
}

pub fn is_cache_hit(headers: &HeaderMap) -> bool {
    headers
        .get(CACHE_HEADER)
        .map(|v| v == "hit")
        .unwrap_or(false)
}

/// Where a proxied response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    PassThrough,
    Error,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
            ResponseSource::PassThrough => "pass-through",
            ResponseSource::Error => "error",
        };
        f.write_str(name)
    }
}

/// Summary line for a proxied request, including where the answer came from.
pub fn log_proxied(
    method: &Method,
    path: &str,
    status: StatusCode,
    source: ResponseSource,
    started: Instant,
) {
    tracing::info!(
        method = %method,
        path,
        status = status.as_u16(),
        source = %source,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
}

fn log_request(info: Info<'_>) {
    tracing::info!(
        method = %info.method(),
        path = info.path(),
        status = info.status().as_u16(),
        elapsed_ms = info.elapsed().as_millis() as u64,
        "request"
    );
}

/// Per-request summary line for the admin endpoints.
pub fn request_log() -> Log<fn(Info<'_>)> {
    warp::log::custom(log_request as fn(Info<'_>))
}
