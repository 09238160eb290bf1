use serde_json::json;

use crate::calc::CalcError;
use crate::model::ValidationError;
use crate::store::StoreError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn bad_params(id: &str, message: impl Into<String>) -> serde_json::Value {
    err(id, "bad_params", message, Some(json!({ "status": 400 })))
}

pub fn not_found(id: &str, kind: &str, record_id: &str) -> serde_json::Value {
    err(
        id,
        "not_found",
        format!("{kind} not found"),
        Some(json!({ "status": 404, "id": record_id })),
    )
}

pub fn store_err(id: &str, e: &StoreError) -> serde_json::Value {
    let status = match e {
        StoreError::Conflict(_) => 409,
        StoreError::Sqlite(_) => 503,
    };
    tracing::warn!(error = %e, "record store request failed");
    err(id, e.code(), e.to_string(), Some(json!({ "status": status })))
}

pub fn validation_err(id: &str, e: &ValidationError) -> serde_json::Value {
    bad_params(id, e.to_string())
}

pub fn calc_err(id: &str, e: &CalcError) -> serde_json::Value {
    let mut details = json!({ "status": e.status() });
    if let CalcError::NotFound { id: record_id, .. } = e {
        details["id"] = json!(record_id);
    }
    if e.status() >= 500 {
        tracing::warn!(error = %e, "report failed");
    }
    err(id, e.code(), e.to_string(), Some(details))
}
