use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

/// Returns the record id, assigning a fresh one when the caller supplied
/// none (or a nil placeholder). Stamps both timestamps.
pub(crate) fn prepare_create(record: &mut Value) -> Uuid {
    let now = json!(Utc::now());
    let id = existing_id(record).unwrap_or_else(Uuid::new_v4);

    if let Value::Object(map) = record {
        map.insert("id".to_string(), json!(id));
        map.insert("created_date".to_string(), now.clone());
        map.insert("updated_date".to_string(), now);
    }

    id
}

pub(crate) fn prepare_update(record: &mut Value, id: Uuid) {
    if let Value::Object(map) = record {
        map.insert("id".to_string(), json!(id));
        map.insert("updated_date".to_string(), json!(Utc::now()));
    }
}

pub(crate) fn record_id(record: &Value) -> Option<Uuid> {
    existing_id(record)
}

fn existing_id(record: &Value) -> Option<Uuid> {
    record
        .get("id")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .filter(|id| !id.is_nil())
}
