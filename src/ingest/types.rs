use serde::Serialize;
use serde_json::{Number, Value};

use crate::domain::InventoryEvent;

pub const TAG_INVENTORY: &str = "tagInventory";
const DETAIL_KEY: &str = "tagInventoryEvent";

/// Body returned to the reader. Always sent with 200.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AckBody {
    pub status: &'static str,
}

impl AckBody {
    pub const OK: AckBody = AckBody { status: "ok" };
    pub const INVALID_JSON: AckBody = AckBody {
        status: "invalid-json",
    };
}

/// Pulls the event list out of a decoded webhook document: a top-level array
/// is the list, an object carries it under `events`, anything else is empty.
pub fn event_list(doc: Value) -> Vec<Value> {
    match doc {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("events") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Keeps `tagInventory` events that carry a detail record, in order.
pub fn normalize(events: Vec<Value>) -> Vec<InventoryEvent> {
    events
        .into_iter()
        .filter_map(|ev| match ev {
            Value::Object(raw) => inventory_event(raw),
            _ => None,
        })
        .collect()
}

fn inventory_event(raw: serde_json::Map<String, Value>) -> Option<InventoryEvent> {
    if raw.get("eventType").and_then(Value::as_str) != Some(TAG_INVENTORY) {
        return None;
    }
    let detail = match raw.get(DETAIL_KEY) {
        Some(Value::Object(detail)) if !detail.is_empty() => detail,
        _ => return None,
    };

    Some(InventoryEvent {
        epc: detail.get("epc").and_then(Value::as_str).map(str::to_owned),
        antenna_port: detail.get("antennaPort").and_then(Value::as_i64),
        rssi: number(detail.get("peakRssiCdbm")),
        phase: number(detail.get("phaseAngle")),
        reader_time: raw.get("timestamp").and_then(Value::as_str).map(str::to_owned),
        raw,
    })
}

fn number(value: Option<&Value>) -> Option<Number> {
    match value {
        Some(Value::Number(n)) => Some(n.clone()),
        _ => None,
    }
}
