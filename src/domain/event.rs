use serde::Serialize;
use serde_json::Number;

/// One element of an inbound webhook batch, exactly as the reader sent it.
pub type RawEvent = serde_json::Map<String, serde_json::Value>;

/// A tag read normalized from a `tagInventory` reader event.
///
/// Fields the reader omitted (or sent with an unexpected type) serialize as
/// `null`; only the detail record itself is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryEvent {
    pub epc: Option<String>,
    pub antenna_port: Option<i64>,
    /// Peak RSSI and phase angle keep the reader's number as written, in
    /// reader-specific units.
    pub rssi: Option<Number>,
    pub phase: Option<Number>,
    /// Reader clock, passed through untouched.
    pub reader_time: Option<String>,
    pub raw: RawEvent,
}

/// Everything sent in one outbound request. Never split.
#[derive(Debug, Clone, Serialize)]
pub struct EventBatch {
    pub source: String,
    pub sent_at: String,
    pub events: Vec<InventoryEvent>,
}

impl EventBatch {
    pub fn new(source: impl Into<String>, sent_at: impl Into<String>, events: Vec<InventoryEvent>) -> Self {
        Self {
            source: source.into(),
            sent_at: sent_at.into(),
            events,
        }
    }
}
