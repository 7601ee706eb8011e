pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod fetch;
pub mod gateway;
pub mod handlers;
pub mod indexing;
pub mod manifest;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod store;
pub mod telemetry;

pub use dispatcher::NotificationDispatcher;
pub use errors::GatewayError;
pub use gateway::OfflineGateway;
pub use models::{AppState, CacheEntry, CachedResponse, FetchOutcome, FetchRequest, RateBudget};
