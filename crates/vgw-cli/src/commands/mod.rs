//! Command implementations for vgw-cli

pub mod configure;
pub mod monitor;
pub mod request;

pub use configure::{faults, parse_alarm_type, remove_alarm, set_alarm, subscribe, unsubscribe};
pub use monitor::{monitor, MonitorOptions};
pub use request::{read, request};
