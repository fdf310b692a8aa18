//! Observable state of a data service

use serde::Serialize;
use serde_json::Value;

use crate::error::ServiceError;

/// What a consumer renders from: `{data, loading, error}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchState {
    /// Last successfully unwrapped payload
    pub data: Option<Value>,
    /// True exactly while a load cycle is running
    pub loading: bool,
    /// Error of the last load cycle, cleared when a new one starts
    pub error: Option<ServiceError>,
}

impl FetchState {
    pub fn is_success(&self) -> bool {
        !self.loading && self.error.is_none() && self.data.is_some()
    }
}

/// Values a data service reloads on when they change
///
/// Compared by value, so re-building an equal list does not trigger a load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dependencies(Vec<Value>);

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one dependency value
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.0.push(value.into());
        self
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for Dependencies {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Dependencies {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initial_state_is_empty() {
        let state = FetchState::default();
        assert!(state.data.is_none());
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert!(!state.is_success());
    }

    #[test]
    fn test_state_serializes_error_as_message() {
        let state = FetchState {
            data: None,
            loading: false,
            error: Some(ServiceError::Rejected("boom".to_string())),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, json!({ "data": null, "loading": false, "error": "boom" }));
    }

    #[test]
    fn test_dependencies_compare_by_value() {
        let a = Dependencies::new().with("line-3").with(42);
        let b = Dependencies::from(vec![json!("line-3"), json!(42)]);
        let c = Dependencies::new().with("line-4").with(42);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_slice().len(), 2);
    }
}
