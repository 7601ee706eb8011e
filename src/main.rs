use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use offline_gateway::{
    AppState,
    NotificationDispatcher,
    OfflineGateway,
    config::{Settings, StoreKind},
    fetch::HyperFetcher,
    indexing::GoogleIndexingClient,
    manifest::StaticAssetManifest,
    models::ServiceAccountCredentials,
    routes::routes,
    store::{CacheStore, DiskCacheStore, MemoryCacheStore},
    telemetry,
};

async fn load_credentials(settings: &Settings) -> anyhow::Result<Option<ServiceAccountCredentials>> {
    let Some(path) = settings.indexing_credentials.as_ref() else {
        tracing::warn!("no indexing credentials configured, announce is disabled");
        return Ok(None);
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading credentials {}", path.display()))?;
    let credentials = ServiceAccountCredentials::from_json(&raw)
        .with_context(|| format!("parsing credentials {}", path.display()))?;
    Ok(Some(credentials))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    telemetry::init(&settings)?;

    let store: Arc<dyn CacheStore> = match settings.cache_store {
        StoreKind::Memory => Arc::new(MemoryCacheStore::new()),
        StoreKind::Disk => Arc::new(
            DiskCacheStore::new(&settings.cache_dir)
                .await
                .with_context(|| format!("opening cache dir {}", settings.cache_dir.display()))?,
        ),
    };

    let manifest = StaticAssetManifest::load(&settings.static_assets, settings.static_dir.as_deref())
        .await
        .context("building static asset manifest")?;
    tracing::info!(assets = manifest.len(), "static asset manifest loaded");

    let fetcher = Arc::new(HyperFetcher::new(settings.origin.clone(), settings.request_timeout()));
    let gateway = Arc::new(
        OfflineGateway::new(settings.cache_name(), manifest, store, fetcher)
            .with_auto_activate(settings.auto_activate),
    );
    if let Err(err) = gateway.start().await {
        tracing::error!(error = %err, "cache generation not installed, serving without offline cache");
    }

    let indexing = GoogleIndexingClient::new(settings.request_timeout())?;
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::new(indexing),
        settings.indexing_max_calls,
        settings.indexing_min_interval(),
    ));

    let state = Arc::new(AppState {
        gateway,
        dispatcher,
        credentials: load_credentials(&settings).await?,
        admin_token: settings.admin_token.clone(),
    });

    tracing::info!(listen = %settings.listen, origin = %settings.origin, "offline gateway running");
    warp::serve(routes(state)).run(settings.listen).await;
    Ok(())
}
