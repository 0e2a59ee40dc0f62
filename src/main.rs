//! swx-events: query surface for the space-weather event interface.
//!
//! Accepts a time window and an optional source filter, runs the
//! aggregation, and prints the merged category list as JSON.

use std::sync::Arc;
use std::time::Duration;

use aggregator::EventAggregator;
use chrono::Duration as ChronoDuration;
use clap::Parser;
use common::TimeWindow;
use coordinator_client::CoordinatorClient;
use event_cache::{Cache, RedisStore};
use event_sources::SourceRegistry;
use tracing::{error, info};

use swx_events::config;

/// Space-weather event aggregation query tool.
#[derive(Parser)]
#[command(name = "swx-events", about = "Query space-weather events from the configured providers")]
struct Cli {
    /// Window anchor timestamp (e.g. 2023-04-01T00:00:00Z).
    #[arg(long)]
    start: String,

    /// Window length in hours; negative looks backward from the anchor.
    #[arg(long, default_value_t = -24)]
    hours: i64,

    /// Comma-separated source names; omit to query every source.
    #[arg(long)]
    sources: Option<String>,

    /// Observation time used to filter records and project coordinates.
    #[arg(long)]
    observation_time: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "swx_events=info,aggregator=info,event_sources=info,event_cache=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let anchor = match config::parse_timestamp(&cli.start) {
        Ok(t) => t,
        Err(e) => {
            error!("Bad --start value: {}", e);
            std::process::exit(1);
        }
    };
    let observation_time = match cli.observation_time.as_deref().map(config::parse_timestamp) {
        Some(Ok(t)) => Some(t),
        Some(Err(e)) => {
            error!("Bad --observation-time value: {}", e);
            std::process::exit(1);
        }
        None => None,
    };
    let window = TimeWindow::new(anchor, ChronoDuration::hours(cli.hours));

    let store = match RedisStore::connect(&cfg.redis_url).await {
        Ok(s) => s,
        Err(e) => {
            error!("Cache backend unavailable: {}", e);
            std::process::exit(1);
        }
    };
    let cache = Arc::new(Cache::new(Arc::new(store)));

    let http = reqwest::Client::builder()
        .user_agent(&cfg.user_agent)
        .pool_max_idle_per_host(4)
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()
        .expect("failed to build provider HTTP client");
    let coordinator = Arc::new(CoordinatorClient::new(
        &cfg.coordinator_url,
        Duration::from_secs(cfg.coordinator_timeout_secs),
        &cfg.user_agent,
    ));

    let registry = SourceRegistry::standard(http, cache.clone(), coordinator);
    let aggregator = EventAggregator::new(cache, registry);

    info!(
        "Querying window {} {:+}h (observation time: {:?})",
        anchor, cli.hours, observation_time
    );

    let result = match cli.sources {
        Some(raw) => {
            let names: Vec<String> = raw
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
            aggregator
                .get_from_sources(&names, window, observation_time)
                .await
        }
        None => aggregator.get_all(window, observation_time).await,
    };

    match result {
        Ok(categories) => {
            let body = serde_json::to_string_pretty(&categories)
                .unwrap_or_else(|_| "[]".to_string());
            println!("{body}");
        }
        Err(e) => {
            error!("Query failed: {}", e);
            std::process::exit(1);
        }
    }
}
