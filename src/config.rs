use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use http::header::HeaderName;
use lazy_static::lazy_static;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3030";
pub const DEFAULT_ORIGIN: &str = "http://localhost:5173";
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const INDEXING_MAX_CALLS: u32 = 5; // per process lifetime
pub const INDEXING_MIN_INTERVAL_MS: u64 = 3000;
pub const CACHE_NAME_PREFIX: &str = "offline-cache-";
pub const CACHE_HEADER: &str = "x-offline-cache";

lazy_static! {
    /// Connection-scoped headers that must not be forwarded or stored.
    pub static ref HOP_BY_HOP_HEADERS: HashSet<HeaderName> = {
        let mut s = HashSet::new();
        for name in [
            "connection",
            "keep-alive",
            "proxy-authenticate",
            "proxy-authorization",
            "te",
            "trailer",
            "transfer-encoding",
            "upgrade",
        ] {
            s.insert(HeaderName::from_static(name));
        }
        s
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Memory,
    Disk,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "offline-gateway", version, about = "Offline-first caching gateway")]
pub struct Settings {
    /// Address the gateway listens on.
    #[arg(long, env = "GATEWAY_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// Base URL of the origin server.
    #[arg(long, env = "GATEWAY_ORIGIN", default_value = DEFAULT_ORIGIN)]
    pub origin: String,

    /// Version tag naming the current cache generation.
    #[arg(long = "cache-version", env = "GATEWAY_CACHE_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub cache_version: String,

    #[arg(long = "cache-store", env = "GATEWAY_CACHE_STORE", value_enum, default_value = "memory")]
    pub cache_store: StoreKind,

    /// Root directory for the disk cache store.
    #[arg(long = "cache-dir", env = "GATEWAY_CACHE_DIR", default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Comma-separated static asset paths cached at install time.
    #[arg(long = "static-assets", env = "GATEWAY_STATIC_ASSETS", value_delimiter = ',')]
    pub static_assets: Vec<String>,

    /// Directory whose files are added to the static asset manifest.
    #[arg(long = "static-dir", env = "GATEWAY_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    #[arg(long = "request-timeout-secs", env = "GATEWAY_REQUEST_TIMEOUT_SECS", default_value_t = REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Activate a freshly installed cache generation without waiting.
    #[arg(
        long = "auto-activate",
        env = "GATEWAY_AUTO_ACTIVATE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub auto_activate: bool,

    #[arg(long = "indexing-max-calls", env = "GATEWAY_INDEXING_MAX_CALLS", default_value_t = INDEXING_MAX_CALLS)]
    pub indexing_max_calls: u32,

    #[arg(long = "indexing-min-interval-ms", env = "GATEWAY_INDEXING_MIN_INTERVAL_MS", default_value_t = INDEXING_MIN_INTERVAL_MS)]
    pub indexing_min_interval_ms: u64,

    /// Service-account JSON used to sign indexing requests.
    #[arg(long = "indexing-credentials", env = "GATEWAY_INDEXING_CREDENTIALS")]
    pub indexing_credentials: Option<PathBuf>,

    /// Bearer token guarding the admin endpoints.
    #[arg(long = "admin-token", env = "GATEWAY_ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    /// Base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", env = "GATEWAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long = "log-json", env = "GATEWAY_LOG_JSON", default_value_t = false, action = clap::ArgAction::Set)]
    pub log_json: bool,
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn indexing_min_interval(&self) -> Duration {
        Duration::from_millis(self.indexing_min_interval_ms)
    }

    pub fn cache_name(&self) -> String {
        cache_name_for(&self.cache_version)
    }
}

pub fn cache_name_for(version: &str) -> String {
    format!("{}{}", CACHE_NAME_PREFIX, version)
}
