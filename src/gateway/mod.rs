//! Offline cache gateway.
//!
//! Static assets are served cache-first. Everything else goes to the network
//! first, successful `200` responses are copied into the current cache
//! generation, and the cache is consulted only when the network fails.
//!
//! Copies are stored under the URL path. A request with a query string is also
//! stored under its full locator, and the offline fallback tries that first
//! before the bare path.

use futures::future::try_join_all;
use http::{Method, StatusCode, Uri};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::errors::{FetchError, InstallError, StoreError};
use crate::fetch::Fetcher;
use crate::manifest::StaticAssetManifest;
use crate::models::{CacheEntry, CachedResponse, FetchOutcome, FetchRequest, GatewayMessage, Lifecycle};
use crate::store::CacheStore;


pub struct OfflineGateway {
    cache_name: String,
    manifest: StaticAssetManifest,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    auto_activate: bool,
    lifecycle: RwLock<Lifecycle>,
    backfills: Mutex<JoinSet<()>>,
}

impl OfflineGateway {
    pub fn new(
        cache_name: impl Into<String>,
        manifest: StaticAssetManifest,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            manifest,
            store,
            fetcher,
            auto_activate: true,
            lifecycle: RwLock::new(Lifecycle::Parsed),
            backfills: Mutex::new(JoinSet::new()),
        }
    }

    /// Keep an installed generation waiting until a `SkipWaiting` message arrives.
    pub fn with_auto_activate(mut self, auto_activate: bool) -> Self {
        self.auto_activate = auto_activate;
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn manifest(&self) -> &StaticAssetManifest {
        &self.manifest
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read().await
    }

    async fn set_lifecycle(&self, state: Lifecycle) {
        *self.lifecycle.write().await = state;
        tracing::info!(cache = %self.cache_name, state = ?state, "gateway lifecycle changed");
    }

    /// Installs, then activates unless configured to wait.
    pub async fn start(&self) -> Result<(), InstallError> {
        self.on_install().await?;
        if self.auto_activate {
            self.on_activate().await?;
        } else {
            tracing::info!(cache = %self.cache_name, "installed generation waiting for skip-waiting");
        }
        Ok(())
    }

    /// Populates the current generation with every static asset.
    ///
    /// All assets are fetched before anything is written; one failure fails the
    /// whole install and nothing is stored.
    pub async fn on_install(&self) -> Result<(), InstallError> {
        self.set_lifecycle(Lifecycle::Installing).await;
        match self.populate().await {
            Ok(count) => {
                tracing::info!(cache = %self.cache_name, assets = count, "install complete");
                self.set_lifecycle(Lifecycle::Installed).await;
                Ok(())
            }
            Err(err) => {
                tracing::error!(cache = %self.cache_name, error = %err, "install failed");
                self.set_lifecycle(Lifecycle::Redundant).await;
                Err(err)
            }
        }
    }

    async fn populate(&self) -> Result<usize, InstallError> {
        self.store.open(&self.cache_name).await?;

        let fetches = self.manifest.iter().map(|path| self.fetch_asset(path));
        let entries = try_join_all(fetches).await?;
        let count = entries.len();

        self.store.put_all(&self.cache_name, entries).await?;
        Ok(count)
    }

    async fn fetch_asset(&self, path: &str) -> Result<CacheEntry, InstallError> {
        let uri: Uri = path.parse().map_err(|e: http::uri::InvalidUri| InstallError::Fetch {
            path: path.to_string(),
            source: FetchError::InvalidUri(e.to_string()),
        })?;
        let response = self
            .fetcher
            .fetch(&FetchRequest::get(uri))
            .await
            .map_err(|source| InstallError::Fetch {
                path: path.to_string(),
                source,
            })?;
        if !response.status.is_success() {
            return Err(InstallError::BadStatus {
                path: path.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok(CacheEntry {
            key: path.to_string(),
            response,
        })
    }

    /// Deletes every generation other than the current one. Returns how many were removed.
    pub async fn on_activate(&self) -> Result<usize, StoreError> {
        self.set_lifecycle(Lifecycle::Activating).await;

        let mut removed = 0;
        for name in self.store.keys().await? {
            if name != self.cache_name && self.store.delete(&name).await? {
                tracing::info!(cache = %name, "deleted stale cache generation");
                removed += 1;
            }
        }

        self.set_lifecycle(Lifecycle::Activated).await;
        Ok(removed)
    }

    pub async fn on_message(&self, message: GatewayMessage) -> Result<(), StoreError> {
        match message {
            GatewayMessage::SkipWaiting => {
                let state = self.lifecycle().await;
                if state == Lifecycle::Installed {
                    self.on_activate().await?;
                } else {
                    tracing::debug!(state = ?state, "skip-waiting ignored");
                }
                Ok(())
            }
        }
    }

    /// Decides how an intercepted request is answered.
    ///
    /// A network failure is never an error here: it falls back to the cache and
    /// then to a `404`. Only cache store failures propagate. A gateway whose
    /// install failed intercepts nothing.
    pub async fn on_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, StoreError> {
        if !request.is_read_only() || self.lifecycle().await == Lifecycle::Redundant {
            return Ok(FetchOutcome::PassThrough);
        }

        self.store.open(&self.cache_name).await?;

        let path = request.path();
        if self.manifest.contains(path) {
            if let Some(hit) = self.store.get(&self.cache_name, path).await? {
                tracing::debug!(path, "static asset served from cache");
                return Ok(FetchOutcome::Handled(hit.into_cache_hit()));
            }
        }

        let key = request.cache_key();
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if request.method == Method::GET
                    && request.has_plain_scheme()
                    && response.status == StatusCode::OK
                {
                    self.backfill(request, &response);
                }
                Ok(FetchOutcome::Handled(response))
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "network fetch failed, trying cache");
                let mut hit = self.store.get(&self.cache_name, &key).await?;
                if hit.is_none() && key != path {
                    hit = self.store.get(&self.cache_name, path).await?;
                }
                match hit {
                    Some(hit) => Ok(FetchOutcome::Handled(hit.into_cache_hit())),
                    None => Ok(FetchOutcome::Handled(CachedResponse::not_found())),
                }
            }
        }
    }

    fn pending_backfills(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.backfills.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Runs off the response path; write errors are logged only.
    fn backfill(&self, request: &FetchRequest, response: &CachedResponse) {
        let path = request.path().to_string();
        let full = request.cache_key();
        let mut entries = vec![CacheEntry {
            key: path,
            response: response.clone(),
        }];
        if full != entries[0].key {
            entries.push(CacheEntry {
                key: full,
                response: response.clone(),
            });
        }

        let store = self.store.clone();
        let cache_name = self.cache_name.clone();
        let mut pending = self.pending_backfills();
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            for entry in entries {
                if let Err(err) = store.put(&cache_name, &entry.key, entry.response).await {
                    tracing::warn!(key = %entry.key, error = %err, "failed to store response copy");
                }
            }
        });
    }

    /// Waits for every response copy still being written.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.pending_backfills());
        while pending.join_next().await.is_some() {}
    }

    /// Sends a side-effecting request straight to the network.
    pub async fn pass_through(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        self.fetcher.fetch(request).await
    }
}
