//! Response validation and envelope unwrapping
//!
//! A fetch function may resolve to the payload itself or to an envelope of the
//! shape `{"success": bool, "data": ..., "error": {"message": ...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ServiceError, REQUEST_FAILED};

/// Error details carried by a failed envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub message: String,
}

/// Response wrapper distinguishing request success from payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(EnvelopeError {
                message: message.into(),
            }),
        }
    }
}

/// Validates a fetch result and returns the application payload
///
/// * `null` is rejected as "no response"
/// * `success: false` is rejected with the embedded message
/// * a non-null `data` field is unwrapped, anything else is the payload itself
pub fn unwrap_response(response: Value) -> Result<Value, ServiceError> {
    let mut fields = match response {
        Value::Null => return Err(ServiceError::NoResponse),
        Value::Object(fields) => fields,
        other => return Ok(other),
    };

    if fields.get("success") == Some(&Value::Bool(false)) {
        return Err(ServiceError::Rejected(failure_message(&fields)));
    }

    if fields.get("data").is_some_and(|data| !data.is_null()) {
        if let Some(data) = fields.remove("data") {
            return Ok(data);
        }
    }

    Ok(Value::Object(fields))
}

fn failure_message(fields: &serde_json::Map<String, Value>) -> String {
    let embedded = match fields.get("error") {
        Some(Value::Object(error)) => error.get("message").and_then(Value::as_str),
        Some(Value::String(message)) => Some(message.as_str()),
        _ => None,
    };

    embedded
        .or_else(|| fields.get("message").and_then(Value::as_str))
        .filter(|message| !message.is_empty())
        .unwrap_or(REQUEST_FAILED)
        .to_string()
}
