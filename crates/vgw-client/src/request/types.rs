//! Types for request/response calls

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::AlarmType;

/// HTTP verbs supported by the gateway API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }

    /// Whether the verb carries a JSON body
    pub fn has_body(self) -> bool {
        matches!(self, Method::Put | Method::Post)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Outbound request handed to the HTTP transport
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the API base URL
    pub path: String,
    pub body: Option<Value>,
}

/// Raw response from the HTTP transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Identity of one in-flight call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub(crate) u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failures where no usable response arrived
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Connection aborted before a response arrived")]
    ConnectionAborted,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// How a call was resolved. Each call resolves exactly once.
#[derive(Debug)]
pub enum CallOutcome {
    /// 2xx with a JSON body (`Value::Null` for an empty body)
    Success(Value),
    /// Network failure, non-2xx status, or teardown
    Failure(RequestError),
    /// The server answered, but not with JSON
    JsonParseError {
        raw: String,
        error: serde_json::Error,
    },
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    pub fn into_result(self) -> crate::Result<Value> {
        match self {
            CallOutcome::Success(value) => Ok(value),
            CallOutcome::Failure(e) => Err(e.into()),
            CallOutcome::JsonParseError { error, .. } => {
                Err(crate::ClientError::ParseError(error.to_string()))
            }
        }
    }
}

/// Body of a subscription configuration request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Minimum interval between events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    /// Only emit when the value changes
    #[serde(default)]
    pub on_change: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            interval_ms: Some(1000),
            on_change: false,
        }
    }
}

/// Body of an alarm configuration request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmConfig {
    #[serde(rename = "type")]
    pub alarm_type: AlarmType,
    /// Threshold, or lower bound for range alarms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Upper bound for range alarms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

impl AlarmConfig {
    pub fn threshold(alarm_type: AlarmType, threshold: f64) -> Self {
        Self {
            alarm_type,
            threshold: Some(threshold),
            upper: None,
        }
    }

    pub fn range(alarm_type: AlarmType, lower: f64, upper: f64) -> Self {
        Self {
            alarm_type,
            threshold: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn on_change() -> Self {
        Self {
            alarm_type: AlarmType::Change,
            threshold: None,
            upper: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alarm_config_body() {
        let body = serde_json::to_value(AlarmConfig::threshold(AlarmType::Above, 120.0)).unwrap();
        assert_eq!(body, json!({ "type": "above", "threshold": 120.0 }));

        let body = serde_json::to_value(AlarmConfig::range(AlarmType::InRange, 1.0, 2.0)).unwrap();
        assert_eq!(
            body,
            json!({ "type": "in_range", "threshold": 1.0, "upper": 2.0 })
        );
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(
            CallOutcome::Success(json!({"a": 1})).into_result().unwrap(),
            json!({"a": 1})
        );
        assert!(matches!(
            CallOutcome::Failure(RequestError::Timeout).into_result(),
            Err(crate::ClientError::Request(RequestError::Timeout))
        ));

        let error = serde_json::from_str::<Value>("<html>").unwrap_err();
        assert!(matches!(
            CallOutcome::JsonParseError {
                raw: "<html>".into(),
                error
            }
            .into_result(),
            Err(crate::ClientError::ParseError(_))
        ));
    }
}
