//! Client for the coordinate transform service.
//!
//! Converts heliographic positions into helioprojective coordinates as
//! seen by the configured observer. Requests carry a short timeout so a
//! dead coordinator degrades to sentinel coordinates at the call site
//! instead of stalling a whole aggregation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{Error, Result};
use serde::Deserialize;
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A helioprojective cartesian coordinate in arcseconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HpcCoordinate {
    pub x: f64,
    pub y: f64,
}

/// Coordinator API client with connection pooling and a bounded timeout.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoordinatorClient {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()
            .expect("failed to build coordinator HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Convert a heliographic latitude/longitude at `event_time` into a
    /// helioprojective coordinate. `target` is the observation time to
    /// project for; the service falls back to the event time without it.
    pub async fn hgs2hpc(
        &self,
        latitude: f64,
        longitude: f64,
        event_time: DateTime<Utc>,
        target: Option<DateTime<Utc>>,
    ) -> Result<HpcCoordinate> {
        let mut query = vec![
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("coord_time", event_time.format(DATE_FORMAT).to_string()),
        ];
        if let Some(target) = target {
            query.push(("target", target.format(DATE_FORMAT).to_string()));
        }
        self.get("hgs2hpc", &query).await
    }

    /// Reproject an earth-view helioprojective coordinate into the
    /// observer's frame at `target`.
    pub async fn hpc(
        &self,
        x: f64,
        y: f64,
        event_time: DateTime<Utc>,
        target: Option<DateTime<Utc>>,
    ) -> Result<HpcCoordinate> {
        let mut query = vec![
            ("x", x.to_string()),
            ("y", y.to_string()),
            ("coord_time", event_time.format(DATE_FORMAT).to_string()),
        ];
        if let Some(target) = target {
            query.push(("target", target.format(DATE_FORMAT).to_string()));
        }
        self.get("hpc", &query).await
    }

    async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<HpcCoordinate> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("Coordinator request: {} {:?}", url, query);

        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Coordinator(format!("{endpoint} request failed: {e}")))?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(Error::Coordinator(format!("{endpoint} returned {status}")));
        }

        resp.json()
            .await
            .map_err(|e| Error::Coordinator(format!("{endpoint} response parse error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let client = CoordinatorClient::new(
            "http://127.0.0.1:8787/",
            Duration::from_secs(1),
            "swx-events/test",
        );
        assert_eq!(client.base_url, "http://127.0.0.1:8787");
    }
}
