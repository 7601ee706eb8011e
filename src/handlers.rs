use bytes::Bytes;
use hyper::{Body, HeaderMap, Method, Response, StatusCode};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use warp::http::Uri;
use warp::path::FullPath;
use warp::Reply;

use crate::errors::GatewayError;
use crate::middleware::{log_proxied, ResponseSource};
use crate::models::{AppState, CachedResponse, FetchOutcome, FetchRequest, GatewayMessage};

#[cfg(test)]
mod tests;

#[derive(Debug, Deserialize)]
pub struct AnnounceRequest {
    pub links: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

pub fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
    }
}

fn error_response(err: &GatewayError) -> warp::reply::Response {
    let code = status_for(err);
    if code.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    warp::reply::with_status(err.to_string(), code).into_response()
}

pub async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(e) = err.find::<GatewayError>() {
        if status_for(e).is_server_error() {
            tracing::error!(error = %e, "request failed");
        }
        (status_for(e), e.to_string())
    } else {
        tracing::error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(message, code))
}

pub fn is_authenticated(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token == expected)
        .unwrap_or(false)
}

/// First hop of a possibly chained `x-forwarded-proto`, if it names a web scheme.
fn forwarded_scheme(value: &str) -> Option<&'static str> {
    let first = value.split(',').next()?.trim();
    if first.eq_ignore_ascii_case("https") {
        Some("https")
    } else if first.eq_ignore_ascii_case("http") {
        Some("http")
    } else {
        None
    }
}

/// Rebuilds the absolute URL the client asked for.
pub fn request_uri(headers: &HeaderMap, full_path: &str, query: &str) -> Result<Uri, GatewayError> {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .and_then(forwarded_scheme)
        .unwrap_or("http");
    let host = headers
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");

    let mut uri_str = format!("{}://{}{}", scheme, host, full_path);
    if !query.is_empty() {
        uri_str.push('?');
        uri_str.push_str(query);
    }
    uri_str
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| GatewayError::BadRequest(format!("{}: {}", uri_str, e)))
}

pub async fn proxy(
    method: Method,
    headers: HeaderMap,
    full_path: FullPath,
    query: String,
    body: Bytes,
    state: Arc<AppState>,
) -> Result<Response<Body>, Infallible> {
    let started = Instant::now();
    let forwarded = forward(method.clone(), headers, &full_path, &query, body, &state).await;
    let (status, source, reply) = match forwarded {
        Ok((response, source)) => (response.status, source, response.into_response()),
        Err(err) => {
            let reply = error_response(&err);
            (reply.status(), ResponseSource::Error, reply)
        }
    };
    log_proxied(&method, full_path.as_str(), status, source, started);
    Ok(reply)
}

async fn forward(
    method: Method,
    headers: HeaderMap,
    full_path: &FullPath,
    query: &str,
    body: Bytes,
    state: &AppState,
) -> Result<(CachedResponse, ResponseSource), GatewayError> {
    let uri = request_uri(&headers, full_path.as_str(), query)?;
    let request = FetchRequest {
        method,
        uri,
        headers,
        body,
    };

    match state.gateway.on_fetch(&request).await? {
        FetchOutcome::Handled(response) if response.is_from_cache() => {
            Ok((response, ResponseSource::Cache))
        }
        FetchOutcome::Handled(response) => Ok((response, ResponseSource::Network)),
        FetchOutcome::PassThrough => {
            let response = state.gateway.pass_through(&request).await?;
            Ok((response, ResponseSource::PassThrough))
        }
    }
}

pub async fn health(state: Arc<AppState>) -> Result<warp::reply::Response, Infallible> {
    let budget = state.dispatcher.budget();
    let body = serde_json::json!({
        "cache": state.gateway.cache_name(),
        "state": state.gateway.lifecycle().await,
        "assets": state.gateway.manifest().len(),
        "indexing": {
            "calls_made": budget.calls_made,
            "max_calls": budget.max_calls,
        },
    });
    Ok(warp::reply::json(&body).into_response())
}

pub async fn skip_waiting(
    headers: HeaderMap,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Infallible> {
    if !is_authenticated(&headers, state.admin_token.as_deref()) {
        return Ok(error_response(&GatewayError::Unauthorized));
    }
    if let Err(e) = state.gateway.on_message(GatewayMessage::SkipWaiting).await {
        return Ok(error_response(&GatewayError::Store(e)));
    }
    let body = serde_json::json!({ "state": state.gateway.lifecycle().await });
    Ok(warp::reply::json(&body).into_response())
}

/// Accepts a batch of URLs and announces them in the background.
pub async fn announce(
    headers: HeaderMap,
    body: Bytes,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Infallible> {
    if !is_authenticated(&headers, state.admin_token.as_deref()) {
        return Ok(error_response(&GatewayError::Unauthorized));
    }
    let Some(credentials) = state.credentials.clone() else {
        return Ok(error_response(&GatewayError::Unavailable(
            "indexing credentials are not configured",
        )));
    };
    let request: AnnounceRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return Ok(error_response(&GatewayError::BadRequest(e.to_string()))),
    };

    let accepted = request.links.len() + request.images.len();
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let report = dispatcher
            .announce(request.links, request.images, &credentials)
            .await;
        tracing::info!(?report, "announce finished");
    });

    let body = serde_json::json!({ "accepted": accepted });
    Ok(warp::reply::with_status(warp::reply::json(&body), StatusCode::ACCEPTED).into_response())
}
