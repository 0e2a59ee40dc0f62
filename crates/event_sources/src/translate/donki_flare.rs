//! DONKI solar flare notifications.
//!
//! A separate feed from the CME catalog: flares carry begin/peak/end
//! times, a class type, the observing instruments, and a `sourceLocation`
//! string that positions the event.

use chrono::{DateTime, Utc};
use common::{Error, EventLink, EventView, Result, SolarEvent};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{parse_datetime, PendingEvent, PendingGroup, Position};

const DONKI_URL: &str = "https://kauai.ccmc.gsfc.nasa.gov/DONKI/";
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn translate(payload: &Value) -> Result<Vec<PendingGroup>> {
    // A null body means the window simply has no flares.
    let records = payload.as_array().cloned().unwrap_or_default();

    let mut data = Vec::new();
    for record in &records {
        match translate_flare(record) {
            Ok(Some(pending)) => data.push(pending),
            Ok(None) => debug!("dropping flare record without a usable location"),
            Err(e) => warn!("skipping malformed flare record: {e}"),
        }
    }

    Ok(vec![PendingGroup {
        name: "Solar Flares".into(),
        contact: String::new(),
        url: DONKI_URL.into(),
        data,
    }])
}

fn translate_flare(record: &Value) -> Result<Option<PendingEvent>> {
    let id = record
        .get("flrID")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Translation("missing flrID".into()))?;
    let start = time_field(record, "beginTime")?;
    let end = time_field(record, "endTime")?;
    let peak = time_field(record, "peakTime")?;

    let Some((latitude, longitude)) = record
        .get("sourceLocation")
        .and_then(Value::as_str)
        .and_then(parse_location)
    else {
        return Ok(None);
    };

    let peak_text = peak.format(DISPLAY_FORMAT).to_string();
    let event = SolarEvent {
        id: id.to_string(),
        label: format!("{peak_text}\nDONKI"),
        short_label: short_label(record, &peak_text),
        event_type: "FL".into(),
        version: String::new(),
        start,
        end,
        source: record.clone(),
        views: vec![EventView {
            name: "Flare".into(),
            content: json!({
                "instruments": instruments(record),
                "begin": start.format(DISPLAY_FORMAT).to_string(),
                "end": end.format(DISPLAY_FORMAT).to_string(),
                "peak": peak_text,
                "class": record.get("classType").cloned().unwrap_or(Value::Null),
                "Active Region": record.get("activeRegionNum").cloned().unwrap_or(Value::Null),
            }),
        }],
        hpc_x: 0.0,
        hpc_y: 0.0,
        link: record.get("link").and_then(Value::as_str).map(|url| EventLink {
            text: "View on DONKI site".into(),
            url: url.to_string(),
        }),
    };

    Ok(Some(PendingEvent {
        event,
        position: Position::Heliographic {
            latitude,
            longitude,
            time: peak,
        },
    }))
}

fn time_field(record: &Value, name: &str) -> Result<DateTime<Utc>> {
    let raw = record
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Translation(format!("missing {name}")))?;
    parse_datetime(raw).ok_or_else(|| Error::Translation(format!("bad {name}: {raw}")))
}

/// Compact label: peak time, then the class and active region when known.
fn short_label(record: &Value, peak_text: &str) -> String {
    let mut label = peak_text.to_string();
    if let Some(class) = record.get("classType").and_then(Value::as_str) {
        label.push_str(&format!(" {class}"));
    }
    if let Some(region) = display(record.get("activeRegionNum")) {
        label.push_str(&format!(" AR {region}"));
    }
    label
}

/// Observing instrument display names, comma separated.
fn instruments(record: &Value) -> String {
    record
        .get("instruments")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|instrument| instrument.get("displayName").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

/// Parses location text like `S30W60`: north positive, south negative,
/// east negative, west positive.
fn parse_location(text: &str) -> Option<(f64, f64)> {
    let text = text.trim();
    let north_south = text.chars().next()?;
    let latitude: f64 = text.get(1..3)?.parse().ok()?;
    let east_west = text.chars().nth(3)?;
    let longitude: f64 = text.get(4..6)?.parse().ok()?;

    let latitude = match north_south {
        'N' => latitude,
        'S' => -latitude,
        _ => return None,
    };
    let longitude = match east_west {
        'E' => -longitude,
        'W' => longitude,
        _ => return None,
    };
    Some((latitude, longitude))
}

fn display(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
