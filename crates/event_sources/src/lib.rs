//! Pluggable event data sources.
//!
//! Each source wraps one upstream provider behind the same contract:
//! `begin_query` starts the work and hands back a [`QueryHandle`],
//! `result` joins it. Handles own all per-query state, so one source
//! instance can serve overlapping aggregations.

pub mod translate;

mod csv;
mod json;
mod registry;

pub use csv::{CsvEventSource, CsvSourceConfig};
pub use json::{JsonEventSource, JsonSourceConfig};
pub use registry::SourceRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Error, EventCategory, EventGroup, Result, TimeWindow};
use coordinator_client::CoordinatorClient;
use tokio::task::JoinHandle;
use tracing::warn;

use translate::{PendingGroup, Position};

/// One queryable provider.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Provider name used to select sources by name. Shared by related
    /// feeds from the same provider.
    fn source_id(&self) -> &str;

    /// Cache key unique to this source instance and window, so a result
    /// set stays addressable for per-source invalidation.
    fn cache_key(&self, window: &TimeWindow) -> String;

    /// Start a query for the window. The upstream request is only issued
    /// on a miss of this source's own cache entry; a hit returns a handle
    /// that resolves instantly.
    ///
    /// Cache backend failures surface here as hard errors.
    async fn begin_query(
        &self,
        window: TimeWindow,
        observation_time: Option<DateTime<Utc>>,
    ) -> Result<QueryHandle>;
}

/// The in-flight side of one source query.
pub struct QueryHandle {
    source: String,
    state: HandleState,
}

enum HandleState {
    Ready(EventCategory),
    Pending(JoinHandle<Result<EventCategory>>),
}

impl QueryHandle {
    /// A handle that resolves instantly (the cache hit path).
    pub fn ready(category: EventCategory) -> Self {
        Self {
            source: category.name.clone(),
            state: HandleState::Ready(category),
        }
    }

    /// A handle backed by a running query task.
    pub fn pending(source: &str, task: JoinHandle<Result<EventCategory>>) -> Self {
        Self {
            source: source.to_string(),
            state: HandleState::Pending(task),
        }
    }

    /// Wait for the query to finish. Upstream failures were already folded
    /// into an empty category by the source task; what surfaces here are
    /// configuration and cache-backend errors.
    pub async fn result(self) -> Result<EventCategory> {
        match self.state {
            HandleState::Ready(category) => Ok(category),
            HandleState::Pending(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::Compute(format!(
                    "query task for {} died: {e}",
                    self.source
                ))),
            },
        }
    }
}

/// Projects pending records into the observer frame.
///
/// Heliographic positions go through the coordinator; a transform failure
/// degrades to the (0, 0) sentinel rather than dropping the record.
pub(crate) async fn resolve_positions(
    groups: Vec<PendingGroup>,
    coordinator: &CoordinatorClient,
    observation_time: Option<DateTime<Utc>>,
) -> Vec<EventGroup> {
    let mut resolved = Vec::with_capacity(groups.len());
    for group in groups {
        let mut data = Vec::with_capacity(group.data.len());
        for pending in group.data {
            let mut event = pending.event;
            match pending.position {
                Position::Projected { x, y } => {
                    event.hpc_x = x;
                    event.hpc_y = y;
                }
                Position::Heliographic {
                    latitude,
                    longitude,
                    time,
                } => match coordinator
                    .hgs2hpc(latitude, longitude, time, observation_time)
                    .await
                {
                    Ok(coord) => {
                        event.hpc_x = coord.x;
                        event.hpc_y = coord.y;
                    }
                    Err(e) => {
                        warn!("coordinate transform failed for {}: {e}", event.id);
                        event.hpc_x = 0.0;
                        event.hpc_y = 0.0;
                    }
                },
            }
            data.push(event);
        }
        resolved.push(EventGroup {
            name: group.name,
            contact: group.contact,
            url: group.url,
            data,
        });
    }
    resolved
}
