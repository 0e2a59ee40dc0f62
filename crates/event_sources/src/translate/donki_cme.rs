//! DONKI coronal mass ejection notifications.

use chrono::Duration;
use common::{Error, EventView, Result, SolarEvent};
use serde_json::Value;
use tracing::{debug, warn};

use super::{parse_datetime, PendingEvent, PendingGroup, Position};

const DONKI_URL: &str = "https://kauai.ccmc.gsfc.nasa.gov/DONKI/";
const DONKI_CONTACT: &str =
    "Space Weather Database of NOtifications, Knowledge, Information (DONKI)";

pub fn translate(payload: &Value) -> Result<Vec<PendingGroup>> {
    // A null body means the window simply has no CMEs.
    let records = payload.as_array().cloned().unwrap_or_default();

    let mut data = Vec::new();
    for record in &records {
        match translate_cme(record) {
            Ok(Some(pending)) => data.push(pending),
            Ok(None) => debug!("dropping CME record without a usable location"),
            Err(e) => warn!("skipping malformed CME record: {e}"),
        }
    }

    Ok(vec![PendingGroup {
        name: "CME".into(),
        contact: DONKI_CONTACT.into(),
        url: DONKI_URL.into(),
        data,
    }])
}

fn translate_cme(record: &Value) -> Result<Option<PendingEvent>> {
    let activity_id = record
        .get("activityID")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Translation("missing activityID".into()))?;
    let start_raw = record
        .get("startTime")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Translation("missing startTime".into()))?;
    let start = parse_datetime(start_raw)
        .ok_or_else(|| Error::Translation(format!("bad startTime: {start_raw}")))?;
    // DONKI gives no end time; show the CME for a day.
    let end = start + Duration::days(1);

    let catalog = record
        .get("catalog")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let analysis = most_accurate_analysis(record);
    let mut label = format!("{catalog}\n{start_raw}\n");
    if let Some(analysis) = analysis {
        label.push_str(&format!(
            "Type: {}\nHalf Angle: {}\nSpeed: {}km/s",
            display(analysis.get("type")),
            display(analysis.get("halfAngle")),
            display(analysis.get("speed")),
        ));
    }

    let Some((latitude, longitude)) = cme_position(record, analysis) else {
        return Ok(None);
    };

    let short_label = if catalog.is_empty() {
        "CME".to_string()
    } else {
        catalog.clone()
    };
    let event = SolarEvent {
        id: activity_id.to_string(),
        label,
        short_label,
        event_type: "CE".into(),
        version: catalog,
        start,
        end,
        source: record.clone(),
        views: vec![EventView {
            name: "CME".into(),
            content: record.clone(),
        }],
        hpc_x: 0.0,
        hpc_y: 0.0,
        link: None,
    };

    Ok(Some(PendingEvent {
        event,
        position: Position::Heliographic {
            latitude,
            longitude,
            time: start,
        },
    }))
}

/// The first analysis flagged `isMostAccurate`, if any.
fn most_accurate_analysis(record: &Value) -> Option<&Value> {
    record
        .get("cmeAnalyses")?
        .as_array()?
        .iter()
        .find(|analysis| {
            analysis
                .get("isMostAccurate")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
}

/// Lat/lon from the most accurate analysis, falling back to the
/// `sourceLocation` text. Records with neither have no usable position.
fn cme_position(record: &Value, analysis: Option<&Value>) -> Option<(f64, f64)> {
    if let Some(analysis) = analysis {
        if let (Some(latitude), Some(longitude)) = (
            analysis.get("latitude").and_then(Value::as_f64),
            analysis.get("longitude").and_then(Value::as_f64),
        ) {
            return Some((latitude, longitude));
        }
    }

    let location = record.get("sourceLocation").and_then(Value::as_str)?;
    if location.trim().is_empty() {
        return None;
    }
    parse_location(location)
}

/// Parses location text like `N10E20`: north/east positive, south/west
/// negative.
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
        'E' => longitude,
        'W' => -longitude,
        _ => return None,
    };
    Some((latitude, longitude))
}

fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
