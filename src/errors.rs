use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Transport-level failure of a network fetch. HTTP error statuses are not fetch errors.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URI: {0}")]
    InvalidUri(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("failed to sign service account assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("indexing request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("indexing service rejected {url}: {status}")]
    Rejected { url: String, status: u16 },
    #[error("token exchange failed with status {0}")]
    Token(u16),
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to fetch static asset {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: FetchError,
    },
    #[error("static asset {path} returned status {status}")]
    BadStatus { path: String, status: u16 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),
    #[error("Service unavailable: {0}")]
    Unavailable(&'static str),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
}

impl From<FetchError> for GatewayError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout => Self::Timeout,
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl warp::reject::Reject for GatewayError {}
