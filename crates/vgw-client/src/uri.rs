//! Fault-code URI grammar
//!
//! Fault codes are addressed as `vehicle/dtc/<bus>_<active|stored>/<ecu>`,
//! e.g. `vehicle/dtc/can0_active/ecu0`. Anything else is rejected; a URI
//! is never coerced into a default bus or status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ROOT_SEGMENT: &str = "vehicle";
const DTC_SEGMENT: &str = "dtc";

/// Errors produced while parsing a fault-code URI
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("expected 4 path segments in '{0}'")]
    SegmentCount(String),

    #[error("expected root segment 'vehicle', found '{0}'")]
    Root(String),

    #[error("expected 'dtc' segment, found '{0}'")]
    Section(String),

    #[error("missing '_<active|stored>' in bus segment '{0}'")]
    MissingStatus(String),

    #[error("unknown fault-code status '{0}'")]
    Status(String),

    #[error("invalid bus name '{0}'")]
    Bus(String),

    #[error("invalid ECU name '{0}'")]
    Ecu(String),
}

/// Whether a fault code is currently active or only stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcStatus {
    Active,
    Stored,
}

impl DtcStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DtcStatus::Active => "active",
            DtcStatus::Stored => "stored",
        }
    }
}

impl FromStr for DtcStatus {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(DtcStatus::Active),
            "stored" => Ok(DtcStatus::Stored),
            other => Err(UriError::Status(other.to_string())),
        }
    }
}

impl fmt::Display for DtcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing key of a fault-code event: (bus, status, ecu)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaultCodeKey {
    pub bus: String,
    pub status: DtcStatus,
    pub ecu: String,
}

impl FaultCodeKey {
    pub fn new(bus: impl Into<String>, status: DtcStatus, ecu: impl Into<String>) -> Self {
        Self {
            bus: bus.into(),
            status,
            ecu: ecu.into(),
        }
    }

    pub fn active(bus: impl Into<String>, ecu: impl Into<String>) -> Self {
        Self::new(bus, DtcStatus::Active, ecu)
    }

    pub fn stored(bus: impl Into<String>, ecu: impl Into<String>) -> Self {
        Self::new(bus, DtcStatus::Stored, ecu)
    }

    pub fn is_active(&self) -> bool {
        self.status == DtcStatus::Active
    }

    /// Build the wire URI for this key
    pub fn to_uri(&self) -> String {
        format!(
            "{}/{}/{}_{}/{}",
            ROOT_SEGMENT, DTC_SEGMENT, self.bus, self.status, self.ecu
        )
    }

    /// Parse a fault-code URI. A single leading `/` is tolerated.
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let trimmed = uri.strip_prefix('/').unwrap_or(uri);
        let segments: Vec<&str> = trimmed.split('/').collect();
        let [root, section, bus_status, ecu] = segments.as_slice() else {
            return Err(UriError::SegmentCount(uri.to_string()));
        };

        if *root != ROOT_SEGMENT {
            return Err(UriError::Root(root.to_string()));
        }
        if *section != DTC_SEGMENT {
            return Err(UriError::Section(section.to_string()));
        }

        let (bus, status) = bus_status
            .rsplit_once('_')
            .ok_or_else(|| UriError::MissingStatus(bus_status.to_string()))?;
        let status = status.parse::<DtcStatus>()?;

        if !is_token(bus, false) {
            return Err(UriError::Bus(bus.to_string()));
        }
        if !is_token(ecu, true) {
            return Err(UriError::Ecu(ecu.to_string()));
        }

        Ok(Self::new(bus, status, *ecu))
    }
}

impl FromStr for FaultCodeKey {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FaultCodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// True when any segment of the URI looks like the fault-code section
/// (`dtc`, in any case, possibly with trailing characters).
///
/// Such URIs must then satisfy the full grammar of [`FaultCodeKey::parse`],
/// so a near miss like `dtc/can0_active/ecu0` or `vehicle/DTC/...` is
/// rejected instead of being routed as plain vehicle data.
pub fn is_fault_code_uri(uri: &str) -> bool {
    uri.split('/').any(|segment| {
        segment
            .get(..DTC_SEGMENT.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(DTC_SEGMENT))
    })
}

fn is_token(s: &str, allow_underscore: bool) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || (allow_underscore && c == '_'))
}
