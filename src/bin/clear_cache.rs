//! Removes cached aggregation results for a time window.
//!
//! Re-derives the all-sources key, every per-source-name key, and every
//! source instance's own key for the window, then deletes them.

use std::sync::Arc;
use std::time::Duration;

use aggregator::EventAggregator;
use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use clap::Parser;
use common::TimeWindow;
use coordinator_client::CoordinatorClient;
use event_cache::{Cache, RedisStore};
use event_sources::SourceRegistry;
use tracing::info;

use swx_events::config;

/// Cache invalidation for the event interface.
#[derive(Parser)]
#[command(name = "clear-cache", about = "Delete cached event results for a window")]
struct Cli {
    /// Anchor timestamp of the window to clear.
    #[arg(long)]
    date: String,

    /// Window length in hours; negative looks backward from the anchor.
    #[arg(long, default_value_t = -24)]
    hours: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clear_cache=info,event_cache=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config().context("loading configuration")?;
    let anchor = config::parse_timestamp(&cli.date).context("parsing --date")?;
    let window = TimeWindow::new(anchor, ChronoDuration::hours(cli.hours));

    let store = RedisStore::connect(&cfg.redis_url)
        .await
        .context("connecting to the cache backend")?;
    let cache = Arc::new(Cache::new(Arc::new(store)));

    let http = reqwest::Client::builder()
        .user_agent(&cfg.user_agent)
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()
        .context("building the HTTP client")?;
    let coordinator = Arc::new(CoordinatorClient::new(
        &cfg.coordinator_url,
        Duration::from_secs(cfg.coordinator_timeout_secs),
        &cfg.user_agent,
    ));

    let registry = SourceRegistry::standard(http, cache.clone(), coordinator);
    let aggregator = EventAggregator::new(cache, registry);

    aggregator.clear_window(window).await?;
    info!("Cleared cache entries for window anchored at {anchor}");
    Ok(())
}
