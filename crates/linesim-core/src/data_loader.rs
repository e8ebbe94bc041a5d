//! Workload loading from JSON.
//!
//! Feature-gated behind `data-loader`. The document shape is a single object
//! with a `"process_list"` array plus one entry per item:
//!
//! ```json
//! {
//!   "process_list": ["drill", "paint"],
//!   "I1": { "arrival": 0, "type": "bolt", "drill": 5, "paint": 3 },
//!   "I2": { "arrival": 2, "drill": 4, "paint": 1 }
//! }
//! ```
//!
//! Items are returned ordered by `(arrival, name)`.

use crate::workload::{ItemSpec, Schedule, ScheduleError};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during workload loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("document root must be an object")]
    NotAnObject,
    #[error("missing or malformed \"process_list\"")]
    ProcessList,
    #[error("item {item}: {reason}")]
    MalformedItem { item: String, reason: String },
}

const PROCESS_LIST: &str = "process_list";
const ARRIVAL: &str = "arrival";
const TYPE: &str = "type";

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Load and validate a schedule from a JSON string.
pub fn load_schedule_json(json: &str) -> Result<Schedule, DataLoadError> {
    let value: Value = serde_json::from_str(json)?;
    build_schedule(value)
}

/// Load and validate a schedule from JSON bytes.
pub fn load_schedule_json_bytes(bytes: &[u8]) -> Result<Schedule, DataLoadError> {
    let value: Value = serde_json::from_slice(bytes)?;
    build_schedule(value)
}

fn malformed(item: &str, reason: impl Into<String>) -> DataLoadError {
    DataLoadError::MalformedItem {
        item: item.to_string(),
        reason: reason.into(),
    }
}

fn parse_item(name: &str, value: &Value) -> Result<ItemSpec, DataLoadError> {
    let fields: &Map<String, Value> = value
        .as_object()
        .ok_or_else(|| malformed(name, "entry must be an object"))?;

    let arrival = fields
        .get(ARRIVAL)
        .ok_or_else(|| malformed(name, "missing \"arrival\""))?
        .as_u64()
        .ok_or_else(|| malformed(name, "\"arrival\" must be a non-negative integer"))?;

    let mut spec = ItemSpec::new(name, arrival);
    match fields.get(TYPE) {
        None | Some(Value::Null) => {}
        Some(Value::String(t)) => spec.item_type = Some(t.clone()),
        Some(other) => spec.item_type = Some(other.to_string()),
    }

    for (key, field) in fields {
        if key == ARRIVAL || key == TYPE {
            continue;
        }
        let ticks = field.as_u64().ok_or_else(|| {
            malformed(name, format!("duration for {key} must be a non-negative integer"))
        })?;
        spec.durations.insert(key.clone(), ticks);
    }
    Ok(spec)
}

fn build_schedule(value: Value) -> Result<Schedule, DataLoadError> {
    let Value::Object(root) = value else {
        return Err(DataLoadError::NotAnObject);
    };

    let process_list: Vec<String> = root
        .get(PROCESS_LIST)
        .and_then(Value::as_array)
        .ok_or(DataLoadError::ProcessList)?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<_>>()
        .ok_or(DataLoadError::ProcessList)?;

    let mut items = Vec::with_capacity(root.len().saturating_sub(1));
    for (name, entry) in &root {
        if name == PROCESS_LIST {
            continue;
        }
        items.push(parse_item(name, entry)?);
    }
    items.sort_by(|a, b| (a.arrival, &a.name).cmp(&(b.arrival, &b.name)));

    let schedule = Schedule {
        process_list,
        items,
    };
    schedule.validate()?;
    Ok(schedule)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SHOP: &str = r#"{
        "process_list": ["drill", "paint"],
        "I2": { "arrival": 2, "drill": 4, "paint": 1 },
        "I1": { "arrival": 0, "type": "bolt", "drill": 5, "paint": 3 },
        "I0": { "arrival": 2, "type": null, "drill": 1, "paint": 1 }
    }"#;

    #[test]
    fn load_orders_by_arrival_then_name() {
        let schedule = load_schedule_json(SHOP).unwrap();
        assert_eq!(schedule.process_list, vec!["drill", "paint"]);
        let names: Vec<&str> = schedule.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["I1", "I0", "I2"]);
        assert_eq!(schedule.items[0].item_type.as_deref(), Some("bolt"));
        assert_eq!(schedule.items[0].durations["drill"], 5);
        assert_eq!(schedule.items[1].item_type, None);
    }

    #[test]
    fn bytes_and_str_agree() {
        let a = load_schedule_json(SHOP).unwrap();
        let b = load_schedule_json_bytes(SHOP.as_bytes()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn numeric_type_tag_is_stringified() {
        let json = r#"{ "process_list": ["p"], "A": { "arrival": 0, "type": 3, "p": 1 } }"#;
        let schedule = load_schedule_json(json).unwrap();
        assert_eq!(schedule.items[0].item_type.as_deref(), Some("3"));
    }

    #[test]
    fn missing_duration_is_schedule_error() {
        let json = r#"{ "process_list": ["p", "q"], "A": { "arrival": 0, "p": 1 } }"#;
        let err = load_schedule_json(json).unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::Schedule(ScheduleError::MissingDuration { .. })
        ));
    }

    #[test]
    fn missing_arrival_is_malformed() {
        let json = r#"{ "process_list": ["p"], "A": { "p": 1 } }"#;
        assert!(matches!(
            load_schedule_json(json),
            Err(DataLoadError::MalformedItem { .. })
        ));
    }

    #[test]
    fn negative_duration_is_malformed() {
        let json = r#"{ "process_list": ["p"], "A": { "arrival": 0, "p": -2 } }"#;
        assert!(matches!(
            load_schedule_json(json),
            Err(DataLoadError::MalformedItem { .. })
        ));
    }

    #[test]
    fn missing_process_list() {
        let json = r#"{ "A": { "arrival": 0 } }"#;
        assert!(matches!(
            load_schedule_json(json),
            Err(DataLoadError::ProcessList)
        ));
    }

    #[test]
    fn root_must_be_object() {
        assert!(matches!(
            load_schedule_json("[1, 2]"),
            Err(DataLoadError::NotAnObject)
        ));
    }

    #[test]
    fn invalid_json() {
        assert!(matches!(
            load_schedule_json("{ not json"),
            Err(DataLoadError::JsonParse(_))
        ));
    }
}
