//! Parser for the provider's "history by ids" payload.
//!
//! Envelope: `{"ret": "0", "errmsg": "...", "data": {"<id>": {record}}}`.
//! Field types drift between provider versions (numbers arrive as strings
//! and vice versa), so everything is read leniently from a `Value`.

use serde_json::Value;

use crate::types::{ProbeResult, StatusDescriptor};

/// History payload errors.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("provider rejected history query (ret={ret}): {message}")]
    Provider { ret: String, message: String },
    #[error("history record for {correlation_id} is malformed: {message}")]
    Malformed {
        correlation_id: String,
        message: String,
    },
}

/// Turn one raw history response into a probe result for `correlation_id`.
///
/// A missing key, an empty/null `data`, or a not-found envelope all mean the
/// record is not visible yet.
pub fn parse_history_response(correlation_id: &str, raw: &str) -> Result<ProbeResult, HistoryError> {
    let body: Value = serde_json::from_str(raw)?;

    let ret = body.get("ret").map(lenient_string).unwrap_or_else(|| "0".to_string());
    if ret != "0" {
        let message = body
            .get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if is_not_found_message(&message) {
            return Ok(ProbeResult::not_found(correlation_id, raw));
        }
        return Err(HistoryError::Provider { ret, message });
    }

    let record = match body.get("data").and_then(|data| data.get(correlation_id)) {
        Some(record) if !record.is_null() => record,
        _ => return Ok(ProbeResult::not_found(correlation_id, raw)),
    };

    let status_code = record
        .get("status")
        .and_then(lenient_i64)
        .ok_or_else(|| HistoryError::Malformed {
            correlation_id: correlation_id.to_string(),
            message: "missing numeric status".to_string(),
        })?;

    let mut descriptor = StatusDescriptor::new(status_code).with_item_count(
        record
            .get("item_list")
            .and_then(Value::as_array)
            .map_or(0, Vec::len),
    );
    if let Some(code) = record.get("fail_code").filter(|v| !v.is_null()) {
        descriptor = descriptor.with_fail_code(lenient_string(code));
    }
    if let Some(finish) = record.get("finish_time").and_then(lenient_i64).filter(|t| *t > 0) {
        descriptor = descriptor.with_finish_time(finish);
    }

    Ok(ProbeResult::observed(correlation_id, descriptor, raw))
}

fn is_not_found_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not found") || lower.contains("not exist")
}

fn lenient_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
