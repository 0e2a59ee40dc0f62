//! Column-name access to HAPI response tables.
//!
//! HAPI responses carry parameter descriptors alongside row-oriented data;
//! a value equal to its parameter's declared "fill" means no data.

use chrono::{DateTime, Utc};
use common::{Error, Result};
use serde_json::Value;

use super::parse_datetime;

pub struct HapiTable {
    names: Vec<String>,
    fills: Vec<Option<Value>>,
    records: Vec<Vec<Value>>,
}

impl HapiTable {
    pub fn parse(payload: &Value) -> Result<Self> {
        let parameters = payload
            .get("parameters")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Translation("HAPI payload missing 'parameters'".into()))?;

        let mut names = Vec::with_capacity(parameters.len());
        let mut fills = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let name = parameter
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Translation("HAPI parameter missing 'name'".into()))?;
            names.push(name.to_string());
            fills.push(parameter.get("fill").filter(|f| !f.is_null()).cloned());
        }

        let records = payload
            .get("data")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.as_array().cloned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            names,
            fills,
            records,
        })
    }

    pub fn records(&self) -> &[Vec<Value>] {
        &self.records
    }

    /// Value of the named column, with the column's fill value mapped to
    /// None. Unknown columns are None, not an error.
    pub fn value<'r>(&self, record: &'r [Value], name: &str) -> Option<&'r Value> {
        let index = self.names.iter().position(|n| n == name)?;
        let value = record.get(index)?;
        if value.is_null() {
            return None;
        }
        if let Some(fill) = &self.fills[index] {
            if value == fill {
                return None;
            }
        }
        Some(value)
    }

    /// Numeric column access; HAPI tables often ship numbers as strings.
    pub fn f64(&self, record: &[Value], name: &str) -> Option<f64> {
        match self.value(record, name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn datetime(&self, record: &[Value], name: &str) -> Option<DateTime<Utc>> {
        parse_datetime(self.value(record, name)?.as_str()?)
    }

    /// The record as a name → value object, fills nulled out.
    pub fn record_json(&self, record: &[Value]) -> Value {
        let mut map = serde_json::Map::new();
        for (index, name) in self.names.iter().enumerate() {
            let mut value = record.get(index).cloned().unwrap_or(Value::Null);
            if let Some(fill) = &self.fills[index] {
                if value == *fill {
                    value = Value::Null;
                }
            }
            map.insert(name.clone(), value);
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> HapiTable {
        HapiTable::parse(&json!({
            "parameters": [
                {"name": "start_window"},
                {"name": "C", "fill": "-1"},
                {"name": "M", "fill": "-1"}
            ],
            "data": [
                ["2023-04-01T00:00:00", "0.75", "-1"]
            ]
        }))
        .expect("valid table")
    }

    #[test]
    fn looks_up_values_by_column_name() {
        let table = table();
        let record = &table.records()[0];
        assert_eq!(table.f64(record, "C"), Some(0.75));
        assert!(table.datetime(record, "start_window").is_some());
    }

    #[test]
    fn fill_values_read_as_none() {
        let table = table();
        let record = &table.records()[0];
        assert_eq!(table.value(record, "M"), None);
        assert_eq!(table.f64(record, "M"), None);
    }

    #[test]
    fn unknown_columns_read_as_none() {
        let table = table();
        let record = &table.records()[0];
        assert_eq!(table.value(record, "X"), None);
    }

    #[test]
    fn record_json_nulls_out_fills() {
        let table = table();
        let json = table.record_json(&table.records()[0]);
        assert_eq!(json["C"], json!("0.75"));
        assert_eq!(json["M"], Value::Null);
    }

    #[test]
    fn missing_parameters_is_an_error() {
        assert!(HapiTable::parse(&json!({"data": []})).is_err());
    }
}
