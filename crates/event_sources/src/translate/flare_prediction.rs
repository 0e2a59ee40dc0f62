//! Flare scoreboard prediction tables.
//!
//! Each configured scoreboard model publishes a HAPI table of per-region
//! flare probabilities; one table becomes one group named after the model.

use common::{Error, EventView, Result, SolarEvent};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::hapi::HapiTable;
use super::{ExtraParams, PendingEvent, PendingGroup, Position};

const SCOREBOARD_URL: &str = "https://ccmc.gsfc.nasa.gov/scoreboards/flare/";

/// Flare classes carried by the scoreboard, in label order.
const FLARE_CLASSES: [&str; 5] = ["C", "CPlus", "M", "MPlus", "X"];

pub fn translate(payload: &Value, extra: &ExtraParams) -> Result<Vec<PendingGroup>> {
    let dataset = extra.dataset.as_deref().ok_or_else(|| {
        Error::MissingParameter("flare prediction translator requires 'dataset'".into())
    })?;

    let table = HapiTable::parse(payload)?;
    let mut data = Vec::new();
    for record in table.records() {
        match translate_record(&table, record, dataset) {
            Ok(Some(pending)) => data.push(pending),
            Ok(None) => debug!("{dataset}: dropping prediction without a location"),
            Err(e) => warn!("{dataset}: skipping malformed prediction record: {e}"),
        }
    }

    Ok(vec![PendingGroup {
        name: dataset.to_string(),
        contact: String::new(),
        url: SCOREBOARD_URL.into(),
        data,
    }])
}

fn translate_record(
    table: &HapiTable,
    record: &[Value],
    dataset: &str,
) -> Result<Option<PendingEvent>> {
    let start = table
        .datetime(record, "start_window")
        .ok_or_else(|| Error::Translation("missing or bad start_window".into()))?;
    let end = table
        .datetime(record, "end_window")
        .ok_or_else(|| Error::Translation("missing or bad end_window".into()))?;

    // Location columns in preference order: NOAA, then Catania, then the
    // model's own estimate.
    let latitude = first_f64(
        table,
        record,
        &["NOAALatitude", "CataniaLatitude", "ModelLatitude"],
    );
    let longitude = first_f64(
        table,
        record,
        &["NOAALongitude", "CataniaLongitude", "ModelLongitude"],
    );
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Ok(None);
    };
    let time = ["NOAALocationTime", "CataniaLocationTime", "ModelLocationTime"]
        .iter()
        .find_map(|name| table.datetime(record, name))
        .unwrap_or(start);

    let source = table.record_json(record);
    let serialized = serde_json::to_string(&source)
        .map_err(|e| Error::Translation(format!("serializing record: {e}")))?;
    let id = hex::encode(Sha256::digest(serialized.as_bytes()));

    let event = SolarEvent {
        id,
        label: prediction_label(table, record, dataset),
        short_label: dataset.to_string(),
        event_type: "FP".into(),
        version: String::new(),
        start,
        end,
        source: source.clone(),
        views: vec![EventView {
            name: "Flare Prediction".into(),
            content: source,
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
            time,
        },
    }))
}

/// Multiline label: the model name, one line per predicted class.
fn prediction_label(table: &HapiTable, record: &[Value], dataset: &str) -> String {
    let mut label = dataset.to_string();
    let mut any = false;
    for class in FLARE_CLASSES {
        if let Some(probability) = table.f64(record, class) {
            any = true;
            let class_name = class.to_uppercase().replace("PLUS", "+");
            label.push_str(&format!(
                "\n{class_name}: {}%",
                format_probability(probability)
            ));
        }
    }
    if !any {
        label.push_str("\nNo probabilities given");
    }
    label
}

/// Percentage with up to two decimals, trailing zeros trimmed.
fn format_probability(probability: f64) -> String {
    let rounded = (probability * 100.0 * 100.0).round() / 100.0;
    let mut text = format!("{rounded:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    text
}

fn first_f64(table: &HapiTable, record: &[Value], names: &[&str]) -> Option<f64> {
    names.iter().find_map(|name| table.f64(record, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "parameters": [
                {"name": "start_window"},
                {"name": "end_window"},
                {"name": "C", "fill": "-1"},
                {"name": "CPlus", "fill": "-1"},
                {"name": "M", "fill": "-1"},
                {"name": "MPlus", "fill": "-1"},
                {"name": "X", "fill": "-1"},
                {"name": "NOAALatitude", "fill": "-999"},
                {"name": "NOAALongitude", "fill": "-999"},
                {"name": "NOAALocationTime"}
            ],
            "data": [
                ["2023-04-01T00:00:00", "2023-04-02T00:00:00",
                 "0.75", "0.305", "-1", "-1", "0.01",
                 "12.0", "-30.0", "2023-04-01T00:00:00"],
                ["2023-04-01T00:00:00", "2023-04-02T00:00:00",
                 "-1", "-1", "-1", "-1", "-1",
                 "5.0", "5.0", "2023-04-01T00:00:00"],
                ["2023-04-01T00:00:00", "2023-04-02T00:00:00",
                 "0.5", "-1", "-1", "-1", "-1",
                 "-999", "-999", null]
            ]
        })
    }

    fn extra() -> ExtraParams {
        ExtraParams {
            dataset: Some("SIDC Operator".into()),
            offset: None,
        }
    }

    #[test]
    fn builds_one_group_named_after_the_model() {
        let groups = translate(&payload(), &extra()).expect("translated");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "SIDC Operator");
        // The third record has fill-value coordinates and is dropped.
        assert_eq!(groups[0].data.len(), 2);
    }

    #[test]
    fn label_lists_predicted_classes() {
        let groups = translate(&payload(), &extra()).expect("translated");
        let label = &groups[0].data[0].event.label;
        assert!(label.starts_with("SIDC Operator"));
        assert!(label.contains("C: 75%"));
        assert!(label.contains("C+: 30.5%"));
        assert!(label.contains("X: 1%"));
        assert!(!label.contains("M:"));
    }

    #[test]
    fn all_null_probabilities_get_the_fallback_line() {
        let groups = translate(&payload(), &extra()).expect("translated");
        assert!(groups[0].data[1]
            .event
            .label
            .contains("No probabilities given"));
    }

    #[test]
    fn position_comes_from_the_noaa_columns() {
        let groups = translate(&payload(), &extra()).expect("translated");
        let Position::Heliographic {
            latitude,
            longitude,
            ..
        } = groups[0].data[0].position
        else {
            panic!("expected a heliographic position");
        };
        assert_eq!(latitude, 12.0);
        assert_eq!(longitude, -30.0);
    }

    #[test]
    fn record_ids_are_distinct_hashes() {
        let groups = translate(&payload(), &extra()).expect("translated");
        assert_ne!(groups[0].data[0].event.id, groups[0].data[1].event.id);
        assert_eq!(groups[0].data[0].event.id.len(), 64);
    }

    #[test]
    fn missing_dataset_is_a_configuration_error() {
        let result = translate(&payload(), &ExtraParams::default());
        assert!(matches!(result, Err(Error::MissingParameter(_))));
    }

    #[test]
    fn probabilities_format_without_trailing_zeros() {
        assert_eq!(format_probability(0.75), "75");
        assert_eq!(format_probability(0.305), "30.5");
        assert_eq!(format_probability(0.30125), "30.13");
    }
}
