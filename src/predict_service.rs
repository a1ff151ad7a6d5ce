//! Invocation envelope: API-Gateway-style events in, proxy results out.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::PredictError;

pub use crate::predict_resolver::predict;

pub const SUCCESS_STATUS_CODE: u16 = 200;
pub const CLIENT_ERROR_STATUS_CODE: u16 = 400;
pub const SERVER_ERROR_STATUS_CODE: u16 = 500;

const CONTENT_TYPE: &str = "Content-Type";
const APPLICATION_JSON: &str = "application/json";

/// Result handed back to the invoking runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded response body
    pub body: String,
    #[serde(rename = "isBase64Encoded")]
    pub is_base64_encoded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        is_success_status_code(self.status_code)
    }

    /// Decode the body back into JSON
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Build an invocation result around a serializable body.
pub fn api_return<T: Serialize>(body: &T, status: u16, error: Option<String>) -> InvocationResult {
    let body = serde_json::to_string(body).unwrap_or_else(|e| {
        json!({"error": {"kind": "inference_error", "message": e.to_string()}}).to_string()
    });
    InvocationResult {
        status_code: status,
        headers: BTreeMap::from([(CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string())]),
        body,
        is_base64_encoded: false,
        error_message: error.filter(|e| !e.is_empty()),
    }
}

/// Failure result carrying the error kind and the offending fields
pub fn error_result(err: &PredictError) -> InvocationResult {
    let message = err.to_string();
    let body = json!({
        "error": {
            "kind": err.kind(),
            "message": message,
            "fields": err.fields(),
            "retryable": err.is_retryable(),
        }
    });
    api_return(&body, err.status_code(), Some(message))
}

pub fn is_success_status_code(status_code: u16) -> bool {
    (200..300).contains(&status_code)
}

pub fn is_fail_status_code(status_code: u16) -> bool {
    (400..600).contains(&status_code)
}

/// Extract the request payload from an invocation event.
///
/// `body` may be a JSON value or a JSON-encoded string (base64 first when
/// `isBase64Encoded` is set).
pub fn parse_envelope(event: &Value) -> Result<Value, PredictError> {
    let Value::Object(event) = event else {
        return Err(PredictError::MalformedRequest(
            "invocation event must be a JSON object".to_string(),
        ));
    };
    let body = match event.get("body") {
        None | Some(Value::Null) => {
            return Err(PredictError::MalformedRequest(
                "invocation event has no body".to_string(),
            ))
        }
        Some(body) => body,
    };

    let Value::String(text) = body else {
        return Ok(body.clone());
    };

    let is_base64 = event
        .get("isBase64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let decoded;
    let text = if is_base64 {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|e| PredictError::MalformedRequest(format!("body is not valid base64: {e}")))?;
        decoded = String::from_utf8(bytes)
            .map_err(|_| PredictError::MalformedRequest("body is not valid UTF-8".to_string()))?;
        decoded.as_str()
    } else {
        text.as_str()
    };

    if text.trim().is_empty() {
        return Err(PredictError::MalformedRequest("body is empty".to_string()));
    }
    serde_json::from_str(text)
        .map_err(|e| PredictError::MalformedRequest(format!("body is not valid JSON: {e}")))
}

/// Wrap a raw request body into a proxy event
pub fn proxy_event(body: &str) -> Value {
    json!({ "body": body, "isBase64Encoded": false })
}
