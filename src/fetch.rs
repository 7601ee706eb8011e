use async_trait::async_trait;
use http::header::HOST;
use http::{HeaderMap, Uri};
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request};
use std::time::Duration;
use tokio::time::timeout;

use crate::config::HOP_BY_HOP_HEADERS;
use crate::errors::FetchError;
use crate::models::{CachedResponse, FetchRequest};

/// The network primitive behind the gateway.
///
/// Any HTTP status counts as a completed fetch; only transport failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError>;
}

/// Forwards requests to the origin server.
pub struct HyperFetcher {
    client: Client<HttpConnector>,
    origin: String,
    timeout: Duration,
}

impl HyperFetcher {
    pub fn new(origin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            origin: origin.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn upstream_uri(&self, request: &FetchRequest) -> Result<Uri, FetchError> {
        let path_and_query = request
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri_str = format!("{}{}", self.origin, path_and_query);
        uri_str
            .parse()
            .map_err(|e: http::uri::InvalidUri| FetchError::InvalidUri(format!("{}: {}", uri_str, e)))
    }
}

pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !HOP_BY_HOP_HEADERS.contains(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

#[async_trait]
impl Fetcher for HyperFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        let uri = self.upstream_uri(request)?;

        let mut req_builder = Request::builder().method(request.method.clone()).uri(uri);
        for (name, value) in strip_hop_by_hop(&request.headers).iter() {
            if *name != HOST {
                req_builder = req_builder.header(name, value);
            }
        }
        let req = req_builder
            .body(Body::from(request.body.clone()))
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let response = match timeout(self.timeout, self.client.request(req)).await {
            Ok(result) => result.map_err(|e| FetchError::Transport(e.to_string()))?,
            Err(_) => return Err(FetchError::Timeout),
        };

        let (parts, body) = response.into_parts();
        let body_bytes = hyper::body::to_bytes(body)
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(CachedResponse::new(
            parts.status,
            strip_hop_by_hop(&parts.headers),
            body_bytes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_uri_keeps_path_and_query() {
        let fetcher = HyperFetcher::new("http://origin:8080/", Duration::from_secs(1));
        let request = FetchRequest::get("http://blog.local/blogs?page=2".parse().unwrap());
        let uri = fetcher.upstream_uri(&request).unwrap();
        assert_eq!(uri.to_string(), "http://origin:8080/blogs?page=2");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("content-type", "text/css".parse().unwrap());

        let stripped = strip_hop_by_hop(&headers);
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped.get("content-type").unwrap(), "text/css");
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_transport_error() {
        // port 9 (discard) is not expected to accept HTTP
        let fetcher = HyperFetcher::new("http://127.0.0.1:9", Duration::from_secs(2));
        let request = FetchRequest::get("http://blog.local/".parse().unwrap());
        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_) | FetchError::Timeout));
    }
}
