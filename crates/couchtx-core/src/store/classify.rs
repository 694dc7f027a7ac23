//! Classify CouchDB HTTP replies into store outcomes.

use serde::Deserialize;

use super::error::StoreError;

/// High-level classification of an HTTP status returned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx: request accepted.
    Success,
    /// 409: revision mismatch.
    Conflict,
    /// 404: missing document or database.
    NotFound,
    /// Anything else (5xx, auth failures, bad requests).
    Other,
}

/// Classify an HTTP status code returned by the store.
pub fn classify_status(code: u32) -> StatusClass {
    match code {
        200..=299 => StatusClass::Success,
        409 => StatusClass::Conflict,
        404 => StatusClass::NotFound,
        _ => StatusClass::Other,
    }
}

/// CouchDB error body: `{"error": "conflict", "reason": "Document update conflict."}`.
#[derive(Debug, Deserialize)]
struct CouchErrorBody {
    error: Option<String>,
    reason: Option<String>,
}

/// Build the store error for a non-2xx reply about document `id`.
pub fn status_error(code: u32, id: &str, body: &[u8]) -> StoreError {
    match classify_status(code) {
        StatusClass::Conflict => StoreError::Conflict { id: id.to_string() },
        StatusClass::NotFound => StoreError::NotFound { id: id.to_string() },
        StatusClass::Success | StatusClass::Other => StoreError::Http {
            status: code,
            reason: error_reason(body),
        },
    }
}

fn error_reason(body: &[u8]) -> String {
    match serde_json::from_slice::<CouchErrorBody>(body) {
        Ok(CouchErrorBody {
            error: Some(error),
            reason: Some(reason),
        }) => format!("{}: {}", error, reason),
        Ok(CouchErrorBody {
            error: Some(text), ..
        })
        | Ok(CouchErrorBody {
            reason: Some(text), ..
        }) => text,
        _ => String::from_utf8_lossy(body).trim().to_string(),
    }
}
