//! Standard response envelope shared by every endpoint:
//! `{ success, data?, error?, timestamp }`.

use chrono::Utc;
use serde_json::{Value, json};

pub fn success(data: Value) -> Value {
    json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

pub fn error(message: impl AsRef<str>) -> Value {
    json!({
        "success": false,
        "error": message.as_ref(),
        "timestamp": Utc::now().to_rfc3339(),
    })
}
