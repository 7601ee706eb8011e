use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};
use hyper::{Body, Response};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::dispatcher::NotificationDispatcher;
use crate::gateway::OfflineGateway;
use crate::middleware::{is_cache_hit, mark_cache_hit};

/// A captured response: what the gateway stores and what it hands back.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, HeaderMap::new(), "Not Found")
    }

    /// Marks the response as served from the offline cache.
    pub fn into_cache_hit(mut self) -> Self {
        mark_cache_hit(&mut self.headers);
        self
    }

    pub fn is_from_cache(&self) -> bool {
        is_cache_hit(&self.headers)
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// One entry of a cache generation.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub response: CachedResponse,
}

/// An intercepted request as seen by the gateway.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn get(uri: Uri) -> Self {
        Self {
            method: Method::GET,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// GET and HEAD have no side effects and may be served from cache.
    pub fn is_read_only(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Full locator: path plus query string. Equal to `path()` without a query.
    pub fn cache_key(&self) -> String {
        match self.uri.query() {
            Some(q) if !q.is_empty() => format!("{}?{}", self.uri.path(), q),
            _ => self.uri.path().to_string(),
        }
    }

    /// Only http and https responses are stored; anything else is an extension or data scheme.
    pub fn has_plain_scheme(&self) -> bool {
        matches!(self.uri.scheme_str(), Some("http") | Some("https"))
    }
}

/// Result of intercepting a request.
#[derive(Debug)]
pub enum FetchOutcome {
    Handled(CachedResponse),
    PassThrough,
}

/// Messages the gateway accepts from its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMessage {
    SkipWaiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Outbound call allowance for the indexing service.
#[derive(Debug, Clone)]
pub struct RateBudget {
    pub max_calls: u32,
    pub min_interval: Duration,
    pub calls_made: u32,
    pub last_call: Option<Instant>,
}

impl RateBudget {
    pub fn new(max_calls: u32, min_interval: Duration) -> Self {
        Self {
            max_calls,
            min_interval,
            calls_made: 0,
            last_call: None,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.calls_made >= self.max_calls
    }

    /// Time left before the next call may go out.
    pub fn wait_time(&self, now: Instant) -> Option<Duration> {
        let last = self.last_call?;
        let elapsed = now.saturating_duration_since(last);
        self.min_interval.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    pub fn consume(&mut self, at: Instant) {
        self.calls_made += 1;
        self.last_call = Some(at);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountCredentials {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// One batch of URLs to announce.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub urls: Vec<String>,
    pub credentials: ServiceAccountCredentials,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DispatchReport {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl DispatchReport {
    pub fn merge(self, other: DispatchReport) -> Self {
        Self {
            attempted: self.attempted + other.attempted,
            succeeded: self.succeeded + other.succeeded,
            failed: self.failed + other.failed,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Shared state behind the HTTP surface.
pub struct AppState {
    pub gateway: Arc<OfflineGateway>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub credentials: Option<ServiceAccountCredentials>,
    pub admin_token: Option<String>,
}
