//! Provider payload translators.
//!
//! Translators are pure: payload in, pending event groups out. Anything
//! that needs I/O (the coordinate projection) happens afterwards in the
//! source task. A malformed individual record is skipped and logged; it
//! never fails the batch.

pub mod donki_cme;
pub mod donki_flare;
pub mod flare_prediction;
pub mod hapi;
pub mod rhessi_flare;

use chrono::{DateTime, NaiveDateTime, Utc};
use common::{Error, Result, SolarEvent, TimeWindow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extra, translator-specific parameters carried by a source definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraParams {
    /// Model label for prediction tables; names the output group.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dataset: Option<String>,

    /// Byte offset of the first data row in a static payload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub offset: Option<u64>,
}

/// Closed set of payload translators, resolved when the registry is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslatorKind {
    DonkiCme,
    DonkiFlare,
    FlarePrediction,
    RhessiFlare,
}

impl TranslatorKind {
    /// Translate a raw JSON payload into pending event groups.
    pub fn translate_json(&self, payload: &Value, extra: &ExtraParams) -> Result<Vec<PendingGroup>> {
        match self {
            Self::DonkiCme => donki_cme::translate(payload),
            Self::DonkiFlare => donki_flare::translate(payload),
            Self::FlarePrediction => flare_prediction::translate(payload, extra),
            Self::RhessiFlare => Err(Error::Translation(
                "RHESSI flares arrive as CSV text, not JSON".into(),
            )),
        }
    }

    /// Translate a raw text payload (CSV) into pending event groups.
    pub fn translate_text(
        &self,
        payload: &str,
        extra: &ExtraParams,
        window: &TimeWindow,
    ) -> Result<Vec<PendingGroup>> {
        match self {
            Self::RhessiFlare => rhessi_flare::translate(payload, extra, window),
            Self::DonkiCme | Self::DonkiFlare | Self::FlarePrediction => Err(Error::Translation(
                "this translator expects a JSON payload".into(),
            )),
        }
    }
}

/// Where a record sits, before projection into the observer frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    /// Heliographic Stonyhurst degrees; needs the coordinator.
    Heliographic {
        latitude: f64,
        longitude: f64,
        time: DateTime<Utc>,
    },
    /// Already helioprojective arcseconds.
    Projected { x: f64, y: f64 },
}

/// A translated record whose screen position is not yet resolved.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub event: SolarEvent,
    pub position: Position,
}

/// One provider sub-grouping of pending records.
#[derive(Debug, Clone)]
pub struct PendingGroup {
    pub name: String,
    pub contact: String,
    pub url: String,
    pub data: Vec<PendingEvent>,
}

/// Parses provider timestamps in the handful of shapes seen upstream
/// (RFC 3339, DONKI's minute-precision stamps, space-separated dates).
pub(crate) fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%MZ",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(t.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_donki_minute_precision_stamps() {
        let t = parse_datetime("2016-09-06T14:12Z").expect("parsed");
        assert_eq!(t.to_rfc3339(), "2016-09-06T14:12:00+00:00");
    }

    #[test]
    fn parses_space_separated_stamps() {
        assert!(parse_datetime("2012-07-05 03:25:44").is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datetime("not a date").is_none());
    }
}
