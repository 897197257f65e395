use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// A milestone notification posted while a flow run executes.
///
/// The tag set is open: executors may introduce new tags without a data-model
/// change, so the payload is a flattened map alongside the shared base shape.
/// The timestamp is stamped by the channel when the event is posted, never by
/// the sender, so every attached observer sees identical content.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "flowRunId")]
    pub flow_run_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ProgressEvent {
    pub fn new(flow_run_id: i64, event_type: &str, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        Self {
            event_type: event_type.to_string(),
            flow_run_id,
            timestamp: None,
            data,
        }
    }
}
