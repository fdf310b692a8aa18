//! Error types surfaced through a data service's `error` state
//!
//! Every failure of a load cycle is captured as a [`ServiceError`] and stored in
//! the service state; nothing is ever rethrown to the consumer.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Message used when a failure envelope carries no usable error text
pub const REQUEST_FAILED: &str = "request failed";

/// Errors that can end a load cycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// No fetch function was supplied to the service
    #[error("fetch function is not defined or not callable")]
    FetcherMissing,

    /// The fetch function resolved to `null`
    #[error("server returned no response")]
    NoResponse,

    /// The response envelope reported `success: false`
    #[error("{0}")]
    Rejected(String),

    /// The fetch function itself failed
    #[error("{0}")]
    Fetch(String),

    /// The fetched value could not be represented as a JSON payload
    #[error("invalid payload: {0}")]
    Payload(String),

    /// The fetch function or unwrapping panicked
    #[error("fetch panicked: {0}")]
    Panicked(String),
}

impl ServiceError {
    /// Human-readable message, as shown next to a retry affordance
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the error is a configuration problem rather than a failed request
    pub fn is_configuration(&self) -> bool {
        matches!(self, ServiceError::FetcherMissing)
    }

    /// Builds an error from a caught panic payload
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        ServiceError::Panicked(message)
    }
}

impl Serialize for ServiceError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_message() {
        let err = ServiceError::FetcherMissing;
        assert_eq!(err.message(), "fetch function is not defined or not callable");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejected_uses_embedded_message() {
        let err = ServiceError::Rejected("boom".to_string());
        assert_eq!(err.message(), "boom");
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_from_panic_string_payloads() {
        let err = ServiceError::from_panic(Box::new("static message"));
        assert_eq!(err, ServiceError::Panicked("static message".to_string()));

        let err = ServiceError::from_panic(Box::new(String::from("owned message")));
        assert_eq!(err, ServiceError::Panicked("owned message".to_string()));

        let err = ServiceError::from_panic(Box::new(42_u32));
        assert_eq!(err, ServiceError::Panicked("unknown panic".to_string()));
    }

    #[test]
    fn test_serializes_as_message() {
        let json = serde_json::to_string(&ServiceError::NoResponse).unwrap();
        assert_eq!(json, "\"server returned no response\"");
    }
}
