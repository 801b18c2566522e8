//! Event model shared by the stream, registry and dispatch layers

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uri::{DtcStatus, FaultCodeKey};

/// `short_name` suffix carried by subscription events
pub const SUBSCRIPTION_SUFFIX: &str = "sub";

/// Category of an inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SubscriptionData,
    AlarmData,
    SubscriptionFaultCode,
    AlarmFaultCode,
}

impl Category {
    pub(crate) fn from_parts(alarm: bool, fault_code: bool) -> Self {
        match (alarm, fault_code) {
            (false, false) => Category::SubscriptionData,
            (true, false) => Category::AlarmData,
            (false, true) => Category::SubscriptionFaultCode,
            (true, true) => Category::AlarmFaultCode,
        }
    }

    pub fn is_alarm(self) -> bool {
        matches!(self, Category::AlarmData | Category::AlarmFaultCode)
    }

    pub fn is_fault_code(self) -> bool {
        matches!(
            self,
            Category::SubscriptionFaultCode | Category::AlarmFaultCode
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::SubscriptionData => "subscription_data",
            Category::AlarmData => "alarm_data",
            Category::SubscriptionFaultCode => "subscription_fault_code",
            Category::AlarmFaultCode => "alarm_fault_code",
        };
        f.write_str(s)
    }
}

/// Which categories a registration accepts for its routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    /// Every category for the key
    #[default]
    Any,
    /// Only subscription events
    Subscriptions,
    /// Only alarm events
    Alarms,
    /// Exactly one category
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(self, category: Category) -> bool {
        match self {
            CategoryFilter::Any => true,
            CategoryFilter::Subscriptions => !category.is_alarm(),
            CategoryFilter::Alarms => category.is_alarm(),
            CategoryFilter::Only(c) => c == category,
        }
    }
}

impl From<Category> for CategoryFilter {
    fn from(category: Category) -> Self {
        CategoryFilter::Only(category)
    }
}

/// Identifier used to match inbound events to registered listeners
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKey {
    /// Vehicle-data endpoint path, without surrounding slashes
    Endpoint(String),
    /// Fault-code (bus, status, ecu) triple
    FaultCode(FaultCodeKey),
}

impl RoutingKey {
    /// Endpoint key; leading and trailing `/` are ignored so
    /// `/vehicle/engine/speed` and `vehicle/engine/speed` route the same.
    pub fn endpoint(path: impl AsRef<str>) -> Self {
        RoutingKey::Endpoint(path.as_ref().trim_matches('/').to_string())
    }

    pub fn fault_code(bus: impl Into<String>, status: DtcStatus, ecu: impl Into<String>) -> Self {
        RoutingKey::FaultCode(FaultCodeKey::new(bus, status, ecu))
    }
}

impl From<FaultCodeKey> for RoutingKey {
    fn from(key: FaultCodeKey) -> Self {
        RoutingKey::FaultCode(key)
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingKey::Endpoint(path) => f.write_str(path),
            RoutingKey::FaultCode(key) => write!(f, "{}", key),
        }
    }
}

/// Alarm condition, selected by the `short_name` suffix of alarm events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmType {
    /// Value rose above the threshold (`_gt`)
    Above,
    /// Value fell below the threshold (`_lt`)
    Below,
    /// Value equals the threshold (`_eq`)
    Equal,
    /// Value differs from the threshold (`_ne`)
    NotEqual,
    /// Value entered a range (`_in`)
    InRange,
    /// Value left a range (`_out`)
    OutOfRange,
    /// Value changed (`_chg`)
    Change,
}

impl AlarmType {
    pub const ALL: [AlarmType; 7] = [
        AlarmType::Above,
        AlarmType::Below,
        AlarmType::Equal,
        AlarmType::NotEqual,
        AlarmType::InRange,
        AlarmType::OutOfRange,
        AlarmType::Change,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            AlarmType::Above => "gt",
            AlarmType::Below => "lt",
            AlarmType::Equal => "eq",
            AlarmType::NotEqual => "ne",
            AlarmType::InRange => "in",
            AlarmType::OutOfRange => "out",
            AlarmType::Change => "chg",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.suffix() == suffix)
    }
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    /// Vehicle-data measurement
    Number(f64),
    /// Fault-code payload, kept as the hex text received
    Hex(String),
}

impl EventValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EventValue::Number(v) => Some(*v),
            EventValue::Hex(_) => None,
        }
    }

    pub fn as_hex(&self) -> Option<&str> {
        match self {
            EventValue::Hex(s) => Some(s),
            EventValue::Number(_) => None,
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventValue::Number(v) => write!(f, "{}", v),
            EventValue::Hex(s) => f.write_str(s),
        }
    }
}

/// A decoded, classified event from the stream. Never mutated after
/// construction; listeners share one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub category: Category,
    pub routing_key: RoutingKey,
    /// Endpoint/ECU name plus category suffix, e.g. `speed_sub`
    pub short_name: String,
    /// Set for alarm categories
    pub alarm_type: Option<AlarmType>,
    /// Per-category sequence number assigned by the gateway
    pub sequence: u64,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    pub value: EventValue,
    /// Timestamp of the measurement itself
    pub value_timestamp: DateTime<Utc>,
}

impl InboundEvent {
    /// Name part of `short_name`, without the category suffix
    pub fn name(&self) -> &str {
        self.short_name
            .rsplit_once('_')
            .map(|(name, _)| name)
            .unwrap_or(&self.short_name)
    }
}
