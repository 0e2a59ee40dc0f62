//! File- and URL-backed CSV event sources.
//!
//! These wrap static archive payloads. The whole translated result is
//! cached effectively forever; window filtering happens inside the
//! translator, which scans only the slice of the archive it needs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Error, EventCategory, Result, TimeWindow};
use coordinator_client::CoordinatorClient;
use event_cache::{derive_key, round_to_hour, Cache, STATIC_TTL};
use tracing::{debug, warn};

use crate::translate::{ExtraParams, TranslatorKind};
use crate::{resolve_positions, DataSource, QueryHandle};

/// Immutable definition of one static-payload provider.
#[derive(Debug, Clone)]
pub struct CsvSourceConfig {
    /// Provider name used for source selection.
    pub source: String,
    /// Category name this feed contributes to.
    pub name: String,
    /// Marker pin for the category; unique across all sources.
    pub pin: String,
    /// `https://` URL or `file://` path of the payload.
    pub uri: String,
    pub translator: TranslatorKind,
    pub extra: ExtraParams,
}

pub struct CsvEventSource {
    spec: CsvSourceConfig,
    http: reqwest::Client,
    cache: Arc<Cache>,
    coordinator: Arc<CoordinatorClient>,
}

impl CsvEventSource {
    pub fn new(
        spec: CsvSourceConfig,
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
impl DataSource for CsvEventSource {
    fn source_id(&self) -> &str {
        &self.spec.source
    }

    fn cache_key(&self, window: &TimeWindow) -> String {
        derive_key(&format!("{}_csv", self.spec.name), window)
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
        let task = tokio::spawn(async move {
            let translated = async {
                let payload = load_payload(&spec, &http).await?;
                spec.translator.translate_text(&payload, &spec.extra, &window)
            }
            .await;

            match translated {
                Ok(pending) => {
                    let groups = resolve_positions(pending, &coordinator, observation_time).await;
                    let category = EventCategory {
                        name: spec.name.clone(),
                        pin: spec.pin.clone(),
                        groups,
                    };
                    // Static payload: the translated slice never changes.
                    cache.set(&key, &category, STATIC_TTL).await?;
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

async fn load_payload(spec: &CsvSourceConfig, http: &reqwest::Client) -> Result<String> {
    if spec.uri.starts_with("http") {
        let resp = http
            .get(&spec.uri)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{}: {e}", spec.name)))?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(Error::Http(format!("{} returned {status}", spec.name)));
        }
        resp.text()
            .await
            .map_err(|e| Error::Http(format!("{}: {e}", spec.name)))
    } else if let Some(path) = spec.uri.strip_prefix("file://") {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Io(format!("{}: reading {path}: {e}", spec.name)))
    } else {
        Err(Error::Config(format!(
            "{}: unknown URI scheme, expected an http or file URI",
            spec.name
        )))
    }
}
