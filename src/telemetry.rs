use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Settings;

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(settings: &Settings) -> anyhow::Result<()> {
    let level: LevelFilter = settings
        .log_level
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid log level {:?}: {}", settings.log_level, e))?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = if settings.log_json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().compact().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
