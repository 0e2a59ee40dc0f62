//! Domain types shared across the event interface.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ── Query Types ───────────────────────────────────────────────────────

/// A query time window anchored at a point in time.
///
/// A negative `length` looks backward from the anchor, a positive one
/// forward. Every data source receives the same window shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub anchor: DateTime<Utc>,
    pub length: Duration,
}

impl TimeWindow {
    pub fn new(anchor: DateTime<Utc>, length: Duration) -> Self {
        Self { anchor, length }
    }

    /// Earlier endpoint of the window.
    pub fn start(&self) -> DateTime<Utc> {
        if self.length < Duration::zero() {
            self.anchor + self.length
        } else {
            self.anchor
        }
    }

    /// Later endpoint of the window.
    pub fn end(&self) -> DateTime<Utc> {
        if self.length < Duration::zero() {
            self.anchor
        } else {
            self.anchor + self.length
        }
    }

    /// Closed-interval containment test.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start() <= t && t <= self.end()
    }
}

// ── Event Types ───────────────────────────────────────────────────────

/// A normalized space-weather event record.
///
/// `hpc_x`/`hpc_y` are helioprojective arcseconds; 0.0 is the sentinel for
/// positions that could not be projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarEvent {
    pub id: String,
    pub label: String,
    pub short_label: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub version: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Raw provider payload this record was built from.
    pub source: serde_json::Value,
    pub views: Vec<EventView>,
    pub hpc_x: f64,
    pub hpc_y: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub link: Option<EventLink>,
}

/// A named display panel attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventView {
    pub name: String,
    pub content: serde_json::Value,
}

/// An external reference attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLink {
    pub text: String,
    pub url: String,
}

/// One provider-defined sub-grouping of events (e.g. one model run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventGroup {
    pub name: String,
    pub contact: String,
    pub url: String,
    pub data: Vec<SolarEvent>,
}

/// Top-level aggregation unit. Sources that share a category name
/// contribute groups to one merged category, never duplicate categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCategory {
    pub name: String,
    pub pin: String,
    pub groups: Vec<EventGroup>,
}
