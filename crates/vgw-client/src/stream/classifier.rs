//! Event classification
//!
//! Maps a decoded frame to an [`InboundEvent`]:
//!
//! ```text
//! {"data"|"alarm": {
//!     "timestamp": "2016-04-01T12:00:00Z",
//!     "uri": "vehicle/engine/baz",
//!     "short_name": "baz_sub",
//!     "sequence": 1,
//!     "baz": { "value": "4.300", "timestamp": "2016-04-01T12:00:00Z" }
//! }}
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use super::types::ClassifyError;
use crate::types::{AlarmType, Category, EventValue, InboundEvent, RoutingKey, SUBSCRIPTION_SUFFIX};
use crate::uri::{is_fault_code_uri, FaultCodeKey};

const DATA_KEY: &str = "data";
const ALARM_KEY: &str = "alarm";

const FIELD_TIMESTAMP: &str = "timestamp";
const FIELD_URI: &str = "uri";
const FIELD_SHORT_NAME: &str = "short_name";
const FIELD_SEQUENCE: &str = "sequence";
const FIELD_VALUE: &str = "value";

/// Outcome of classifying a well-formed frame
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Event(InboundEvent),
    /// Neither a `data` nor an `alarm` wrapper
    Unrecognized,
}

/// Classify one decoded frame
pub fn classify(frame: &Map<String, Value>) -> Result<Classified, ClassifyError> {
    let (wrapper, body) = match frame.iter().next() {
        Some((key, body)) if frame.len() == 1 => (key.as_str(), body),
        _ => return Ok(Classified::Unrecognized),
    };

    let (alarm, wrapper) = match wrapper {
        DATA_KEY => (false, DATA_KEY),
        ALARM_KEY => (true, ALARM_KEY),
        _ => return Ok(Classified::Unrecognized),
    };

    let body = body
        .as_object()
        .ok_or(ClassifyError::MalformedBody(wrapper))?;

    let timestamp = parse_timestamp(str_field(body, FIELD_TIMESTAMP)?)?;
    let uri = str_field(body, FIELD_URI)?;
    let short_name = str_field(body, FIELD_SHORT_NAME)?;
    let sequence = body
        .get(FIELD_SEQUENCE)
        .ok_or(ClassifyError::MissingField(FIELD_SEQUENCE))?
        .as_u64()
        .ok_or_else(|| ClassifyError::InvalidField {
            field: FIELD_SEQUENCE.to_string(),
            reason: "expected a non-negative integer".to_string(),
        })?;

    let alarm_type = alarm_type_for(short_name, alarm)?;

    let (payload_name, payload) = single_payload(body)?;
    let payload = payload.as_object().ok_or_else(|| ClassifyError::InvalidField {
        field: payload_name.to_string(),
        reason: "expected an object".to_string(),
    })?;
    let raw_value = payload
        .get(FIELD_VALUE)
        .ok_or(ClassifyError::MissingField(FIELD_VALUE))?;
    let value_timestamp = parse_timestamp(str_field(payload, FIELD_TIMESTAMP)?)?;

    let (routing_key, value) = if is_fault_code_uri(uri) {
        let key = FaultCodeKey::parse(uri)?;
        (RoutingKey::FaultCode(key), hex_value(raw_value)?)
    } else {
        let key = RoutingKey::endpoint(uri);
        if matches!(&key, RoutingKey::Endpoint(path) if path.is_empty()) {
            return Err(ClassifyError::InvalidField {
                field: FIELD_URI.to_string(),
                reason: "empty endpoint path".to_string(),
            });
        }
        (key, numeric_value(raw_value)?)
    };

    Ok(Classified::Event(InboundEvent {
        category: Category::from_parts(alarm, routing_key_is_fault(&routing_key)),
        routing_key,
        short_name: short_name.to_string(),
        alarm_type,
        sequence,
        timestamp,
        value,
        value_timestamp,
    }))
}

fn routing_key_is_fault(key: &RoutingKey) -> bool {
    matches!(key, RoutingKey::FaultCode(_))
}

fn str_field<'a>(obj: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, ClassifyError> {
    obj.get(field)
        .ok_or(ClassifyError::MissingField(field))?
        .as_str()
        .ok_or_else(|| ClassifyError::InvalidField {
            field: field.to_string(),
            reason: "expected a string".to_string(),
        })
}

/// The one key besides the fixed header fields
fn single_payload(body: &Map<String, Value>) -> Result<(&str, &Value), ClassifyError> {
    let mut extra = body.iter().filter(|(k, _)| {
        !matches!(
            k.as_str(),
            FIELD_TIMESTAMP | FIELD_URI | FIELD_SHORT_NAME | FIELD_SEQUENCE
        )
    });

    match (extra.next(), extra.next()) {
        (Some((name, value)), None) => Ok((name.as_str(), value)),
        (None, _) => Err(ClassifyError::PayloadKeys(0)),
        (Some(_), Some(_)) => Err(ClassifyError::PayloadKeys(2 + extra.count())),
    }
}

/// Check the `short_name` suffix against the wrapper and pick the alarm type
fn alarm_type_for(short_name: &str, alarm: bool) -> Result<Option<AlarmType>, ClassifyError> {
    let (_, suffix) = short_name
        .rsplit_once('_')
        .ok_or_else(|| ClassifyError::ShortName(short_name.to_string()))?;

    match (alarm, suffix == SUBSCRIPTION_SUFFIX) {
        (false, true) => Ok(None),
        (false, false) => Err(ClassifyError::CategoryMismatch {
            short_name: short_name.to_string(),
            family: "subscription",
        }),
        (true, true) => Err(ClassifyError::CategoryMismatch {
            short_name: short_name.to_string(),
            family: "alarm",
        }),
        (true, false) => AlarmType::from_suffix(suffix)
            .map(Some)
            .ok_or_else(|| ClassifyError::UnknownAlarmType(short_name.to_string())),
    }
}

/// Accepts a JSON number or a decimal string of any precision
fn numeric_value(raw: &Value) -> Result<EventValue, ClassifyError> {
    let number = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    number
        .filter(|v| v.is_finite())
        .map(EventValue::Number)
        .ok_or_else(|| ClassifyError::InvalidValue(format!("expected a number, got {}", raw)))
}

fn hex_value(raw: &Value) -> Result<EventValue, ClassifyError> {
    let text = raw
        .as_str()
        .ok_or_else(|| ClassifyError::InvalidValue(format!("expected a hex string, got {}", raw)))?;

    if text.is_empty() || hex::decode(text).is_err() {
        return Err(ClassifyError::InvalidValue(format!(
            "'{}' is not a hex payload",
            text
        )));
    }

    Ok(EventValue::Hex(text.to_string()))
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS` taken as UTC
pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, ClassifyError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| ClassifyError::Timestamp(text.to_string()))
}
