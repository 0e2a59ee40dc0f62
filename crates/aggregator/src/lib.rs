//! Multi-source fan-out/fan-in aggregation.
//!
//! The entry point for querying every event the interface provides. Each
//! aggregate query runs under the cache's single-flight guard, so
//! overlapping requests for the same window trigger one upstream fan-out
//! across all processes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Error, EventCategory, Result, TimeWindow};
use event_cache::{default_expiry, derive_key, Cache};
use event_sources::{DataSource, SourceRegistry};
use tracing::debug;

/// Cache identity for queries spanning the whole registry.
const ALL_SOURCES_ID: &str = "AllSources";

pub struct EventAggregator {
    cache: Arc<Cache>,
    registry: SourceRegistry,
}

impl EventAggregator {
    pub fn new(cache: Arc<Cache>, registry: SourceRegistry) -> Self {
        Self { cache, registry }
    }

    /// All events from every configured source for the window.
    pub async fn get_all(
        &self,
        window: TimeWindow,
        observation_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventCategory>> {
        let key = derive_key(ALL_SOURCES_ID, &window);
        let ttl = default_expiry(window.anchor);
        let sources = self.registry.all();
        self.cache
            .get_or_compute(&key, ttl, || self.query(sources, window, observation_time))
            .await
    }

    /// Events from the named sources only. An empty name list is a no-op,
    /// not an error; permutations of the same names share a cache entry.
    pub async fn get_from_sources(
        &self,
        names: &[String],
        window: TimeWindow,
        observation_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventCategory>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut sorted = names.to_vec();
        sorted.sort();
        let identifier = serde_json::to_string(&sorted)
            .map_err(|e| Error::Json(format!("encoding source names: {e}")))?;
        let key = derive_key(&identifier, &window);
        let ttl = default_expiry(window.anchor);
        let sources = self.registry.with_names(&sorted);
        self.cache
            .get_or_compute(&key, ttl, || self.query(sources, window, observation_time))
            .await
    }

    /// One fan-out round: start every source, collect in dispatch order,
    /// merge by category, then apply the observation-time filter.
    ///
    /// All queries are issued before any result is awaited, so total wall
    /// time tracks the slowest source rather than the sum. A source whose
    /// upstream failed contributes an empty category; only configuration
    /// and cache-backend errors abort the round.
    async fn query(
        &self,
        sources: Vec<Arc<dyn DataSource>>,
        window: TimeWindow,
        observation_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventCategory>> {
        debug!("querying {} sources", sources.len());

        let mut handles = Vec::with_capacity(sources.len());
        for source in &sources {
            handles.push(source.begin_query(window, observation_time).await?);
        }

        let mut categories = Vec::with_capacity(handles.len());
        for handle in handles {
            categories.push(handle.result().await?);
        }

        let mut merged = merge_categories(categories);
        if let Some(observation_time) = observation_time {
            filter_by_observation_time(&mut merged, observation_time);
        }
        Ok(merged)
    }

    /// Delete the aggregate and per-source cache entries for the window.
    pub async fn clear_window(&self, window: TimeWindow) -> Result<()> {
        self.cache
            .clear_key(&derive_key(ALL_SOURCES_ID, &window))
            .await?;
        for source in self.registry.all() {
            let identifier = serde_json::to_string(&[source.source_id()])
                .map_err(|e| Error::Json(format!("encoding source name: {e}")))?;
            self.cache.clear_key(&derive_key(&identifier, &window)).await?;
            self.cache.clear_key(&source.cache_key(&window)).await?;
        }
        Ok(())
    }
}

/// Folds categories with the same name into one. The first occurrence
/// creates the entry; later occurrences append their groups in dispatch
/// order. Groups are never merged with each other or deduplicated.
pub fn merge_categories(categories: Vec<EventCategory>) -> Vec<EventCategory> {
    let mut merged: Vec<EventCategory> = Vec::new();
    for category in categories {
        match merged.iter_mut().find(|c| c.name == category.name) {
            Some(existing) => existing.groups.extend(category.groups),
            None => merged.push(category),
        }
    }
    merged
}

/// Drops records whose closed `[start, end]` interval does not contain
/// the observation time.
pub fn filter_by_observation_time(
    categories: &mut [EventCategory],
    observation_time: DateTime<Utc>,
) {
    for category in categories.iter_mut() {
        for group in category.groups.iter_mut() {
            group
                .data
                .retain(|event| event.start <= observation_time && observation_time <= event.end);
        }
    }
}
