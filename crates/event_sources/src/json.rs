//! JSON-over-HTTP event sources.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Error, EventCategory, EventGroup, Result, TimeWindow};
use coordinator_client::CoordinatorClient;
use event_cache::{default_expiry, derive_key, round_to_hour, Cache};
use serde_json::Value;
use tracing::{debug, warn};

use crate::translate::{ExtraParams, TranslatorKind};
use crate::{resolve_positions, DataSource, QueryHandle};

/// Immutable definition of one JSON-over-HTTP provider.
#[derive(Debug, Clone)]
pub struct JsonSourceConfig {
    /// Provider name used for source selection; shared by related feeds.
    pub source: String,
    /// Category name this feed contributes to.
    pub name: String,
    /// Marker pin for the category; unique across all sources.
    pub pin: String,
    pub uri: String,
    /// Query string parameter carrying the window start.
    pub start_param: String,
    /// Query string parameter carrying the window end.
    pub end_param: String,
    /// chrono format for rendering the window endpoints.
    pub date_format: String,
    /// Constant query parameters appended to every request.
    pub query: Vec<(String, String)>,
    pub translator: TranslatorKind,
    pub extra: ExtraParams,
}

pub struct JsonEventSource {
    spec: JsonSourceConfig,
    http: reqwest::Client,
    cache: Arc<Cache>,
    coordinator: Arc<CoordinatorClient>,
}

impl JsonEventSource {
    pub fn new(
        spec: JsonSourceConfig,
        http: reqwest::Client,
        cache: Arc<Cache>,
        coordinator: Arc<CoordinatorClient>,
    ) -> Self {
        Self {
            spec,
            http,
            cache,
            coordinator,
        }
    }
}

#[async_trait]
impl DataSource for JsonEventSource {
    fn source_id(&self) -> &str {
        &self.spec.source
    }

    fn cache_key(&self, window: &TimeWindow) -> String {
        let spec = &self.spec;
        let query = serde_json::to_string(&spec.query).unwrap_or_default();
        let extra = serde_json::to_string(&spec.extra).unwrap_or_default();
        let identifier = format!("{} {} {}{query}{extra}", spec.source, spec.name, spec.pin);
        derive_key(&identifier, window)
    }

    async fn begin_query(
        &self,
        window: TimeWindow,
        observation_time: Option<DateTime<Utc>>,
    ) -> Result<QueryHandle> {
        let window = TimeWindow::new(round_to_hour(window.anchor), window.length);
        let key = self.cache_key(&window);
        if let Some(category) = self.cache.get::<EventCategory>(&key).await? {
            debug!("{}: cache hit", self.spec.name);
            return Ok(QueryHandle::ready(category));
        }

        let spec = self.spec.clone();
        let http = self.http.clone();
        let cache = self.cache.clone();
        let coordinator = self.coordinator.clone();
        let ttl = default_expiry(window.anchor);
        let task = tokio::spawn(async move {
            match fetch_and_translate(&spec, &http, &coordinator, &window, observation_time).await {
                Ok(groups) => {
                    let category = EventCategory {
                        name: spec.name.clone(),
                        pin: spec.pin.clone(),
                        groups,
                    };
                    cache.set(&key, &category, ttl).await?;
                    Ok(category)
                }
                Err(e @ Error::MissingParameter(_)) | Err(e @ Error::Config(_)) => Err(e),
                Err(e) => {
                    warn!("{}: query failed: {e}", spec.name);
                    Ok(EventCategory {
                        name: spec.name.clone(),
                        pin: spec.pin.clone(),
                        groups: Vec::new(),
                    })
                }
            }
        });
        Ok(QueryHandle::pending(&self.spec.name, task))
    }
}

async fn fetch_and_translate(
    spec: &JsonSourceConfig,
    http: &reqwest::Client,
    coordinator: &CoordinatorClient,
    window: &TimeWindow,
    observation_time: Option<DateTime<Utc>>,
) -> Result<Vec<EventGroup>> {
    let start = window.start().format(&spec.date_format).to_string();
    let end = window.end().format(&spec.date_format).to_string();
    let mut query: Vec<(&str, String)> = vec![
        (spec.start_param.as_str(), start),
        (spec.end_param.as_str(), end),
    ];
    for (name, value) in &spec.query {
        query.push((name.as_str(), value.clone()));
    }

    debug!("Fetching {}: {} {:?}", spec.name, spec.uri, query);

    let resp = http
        .get(&spec.uri)
        .query(&query)
        .send()
        .await
        .map_err(|e| Error::Http(format!("{}: {e}", spec.name)))?;

    let status = resp.status().as_u16();
    if status != 200 {
        let body = resp.text().await.unwrap_or_default();
        // Truncate on a char boundary; error pages are not always ASCII.
        let preview: String = body.chars().take(500).collect();
        return Err(Error::Http(format!(
            "{} returned {}: {}",
            spec.name, status, preview
        )));
    }

    let payload: Value = resp
        .json()
        .await
        .map_err(|e| Error::Json(format!("{}: {e}", spec.name)))?;

    let pending = spec.translator.translate_json(&payload, &spec.extra)?;
    Ok(resolve_positions(pending, coordinator, observation_time).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use event_cache::MemoryStore;

    fn spec(uri: &str) -> JsonSourceConfig {
        JsonSourceConfig {
            source: "CCMC".into(),
            name: "DONKI".into(),
            pin: "C3".into(),
            uri: uri.into(),
            start_param: "startDate".into(),
            end_param: "endDate".into(),
            date_format: "%Y-%m-%d".into(),
            query: Vec::new(),
            translator: TranslatorKind::DonkiCme,
            extra: ExtraParams::default(),
        }
    }

    fn source(uri: &str, cache: Arc<Cache>) -> JsonEventSource {
        JsonEventSource::new(
            spec(uri),
            reqwest::Client::new(),
            cache,
            Arc::new(CoordinatorClient::new(
                "http://127.0.0.1:1",
                std::time::Duration::from_millis(100),
                "swx-events/test",
            )),
        )
    }

    fn window() -> TimeWindow {
        TimeWindow::new(Utc::now(), Duration::days(-1))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreachable_upstream_degrades_to_an_empty_category() {
        // Port 1 refuses connections; the source must not error out.
        let cache = Arc::new(Cache::new(Arc::new(MemoryStore::new())));
        let source = source("http://127.0.0.1:1/events", cache);
        let handle = source
            .begin_query(window(), None)
            .await
            .expect("begin_query");
        let category = handle.result().await.expect("category");
        assert_eq!(category.name, "DONKI");
        assert_eq!(category.pin, "C3");
        assert!(category.groups.is_empty());
    }

    #[tokio::test]
    async fn cache_hit_returns_without_contacting_upstream() {
        let cache = Arc::new(Cache::new(Arc::new(MemoryStore::new())));
        let source = source("http://127.0.0.1:1/events", cache.clone());
        let stored = EventCategory {
            name: "DONKI".into(),
            pin: "C3".into(),
            groups: vec![EventGroup {
                name: "CME".into(),
                contact: String::new(),
                url: String::new(),
                data: Vec::new(),
            }],
        };
        let w = window();
        cache
            .set(&source.cache_key(&w), &stored, std::time::Duration::from_secs(60))
            .await
            .expect("seed cache");

        let handle = source.begin_query(w, None).await.expect("begin_query");
        let category = handle.result().await.expect("category");
        assert_eq!(category, stored);
    }

    #[test]
    fn cache_keys_differ_per_feed_configuration() {
        let cache = Arc::new(Cache::new(Arc::new(MemoryStore::new())));
        let a = source("http://example.invalid/a", cache.clone());
        let mut other = spec("http://example.invalid/a");
        other.query = vec![("id".into(), "SIDC_Operator_REGIONS".into())];
        let b = JsonEventSource::new(
            other,
            reqwest::Client::new(),
            cache,
            Arc::new(CoordinatorClient::new(
                "http://127.0.0.1:1",
                std::time::Duration::from_millis(100),
                "swx-events/test",
            )),
        );
        let w = window();
        assert_ne!(a.cache_key(&w), b.cache_key(&w));
    }
}
