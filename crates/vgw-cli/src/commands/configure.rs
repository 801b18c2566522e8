//! Subscription, alarm and fault-code commands

use anyhow::{bail, Context, Result};
use serde_json::Value;
use vgw_client::{AlarmConfig, AlarmType, FaultCodeKey, GatewayClient, SubscriptionConfig};

use crate::output::{format_json_value, FaultCodeRow, OutputContext};

pub async fn subscribe(
    client: &GatewayClient,
    endpoint: &str,
    interval_ms: Option<u64>,
    on_change: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let config = SubscriptionConfig {
        interval_ms: interval_ms.or(SubscriptionConfig::default().interval_ms),
        on_change,
    };

    let response = client
        .configure_subscription(endpoint, &config)
        .await
        .with_context(|| format!("Failed to subscribe to {}", endpoint))?;

    ctx.success(&format!("Subscribed to {}", endpoint));
    print_if_present(&response, ctx);
    Ok(())
}

pub async fn unsubscribe(client: &GatewayClient, endpoint: &str, ctx: &OutputContext) -> Result<()> {
    client
        .remove_subscription(endpoint)
        .await
        .with_context(|| format!("Failed to unsubscribe from {}", endpoint))?;

    ctx.success(&format!("Unsubscribed from {}", endpoint));
    Ok(())
}

pub async fn set_alarm(
    client: &GatewayClient,
    endpoint: &str,
    alarm_type: AlarmType,
    threshold: Option<f64>,
    upper: Option<f64>,
    ctx: &OutputContext,
) -> Result<()> {
    let config = alarm_config(alarm_type, threshold, upper)?;

    let response = client
        .configure_alarm(endpoint, &config)
        .await
        .with_context(|| format!("Failed to set alarm on {}", endpoint))?;

    ctx.success(&format!(
        "Alarm {}_{} set",
        endpoint.trim_matches('/').rsplit('/').next().unwrap_or(endpoint),
        alarm_type.suffix()
    ));
    print_if_present(&response, ctx);
    Ok(())
}

pub async fn remove_alarm(
    client: &GatewayClient,
    endpoint: &str,
    alarm_type: AlarmType,
    ctx: &OutputContext,
) -> Result<()> {
    client
        .remove_alarm(endpoint, alarm_type)
        .await
        .with_context(|| format!("Failed to remove alarm from {}", endpoint))?;

    ctx.success(&format!("Alarm removed from {}", endpoint));
    Ok(())
}

/// Read and list fault codes for one ECU
pub async fn faults(client: &GatewayClient, key: &FaultCodeKey, ctx: &OutputContext) -> Result<()> {
    let response = client
        .read_fault_codes(key)
        .await
        .with_context(|| format!("Failed to read fault codes for {}", key))?;

    let codes = match &response {
        Value::Array(codes) => codes,
        Value::Object(map) => match map.get("codes").or_else(|| map.get("value")) {
            Some(Value::Array(codes)) => codes,
            _ => {
                ctx.print_value(&response);
                return Ok(());
            }
        },
        _ => {
            ctx.print_value(&response);
            return Ok(());
        }
    };

    let rows: Vec<FaultCodeRow> = codes
        .iter()
        .map(|code| FaultCodeRow {
            bus: key.bus.clone(),
            status: key.status.to_string(),
            ecu: key.ecu.clone(),
            code: format_json_value(code),
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}

/// Accepts the alarm name (`above`) or its short-name suffix (`gt`)
pub fn parse_alarm_type(value: &str) -> std::result::Result<AlarmType, String> {
    AlarmType::from_suffix(value)
        .or_else(|| serde_json::from_value(Value::String(value.to_string())).ok())
        .ok_or_else(|| {
            let suffixes: Vec<&str> = AlarmType::ALL.iter().map(|t| t.suffix()).collect();
            format!(
                "unknown alarm type '{}', expected a name like 'above' or one of: {}",
                value,
                suffixes.join(", ")
            )
        })
}

fn alarm_config(alarm_type: AlarmType, threshold: Option<f64>, upper: Option<f64>) -> Result<AlarmConfig> {
    let config = match alarm_type {
        AlarmType::Change => AlarmConfig::on_change(),
        AlarmType::InRange | AlarmType::OutOfRange => match (threshold, upper) {
            (Some(lower), Some(upper)) if lower <= upper => AlarmConfig::range(alarm_type, lower, upper),
            (Some(_), Some(_)) => bail!("--threshold must not exceed --upper"),
            _ => bail!("Range alarms need both --threshold and --upper"),
        },
        _ => match threshold {
            Some(threshold) => AlarmConfig::threshold(alarm_type, threshold),
            None => bail!("Alarm type {} needs --threshold", alarm_type.suffix()),
        },
    };
    Ok(config)
}

fn print_if_present(response: &Value, ctx: &OutputContext) {
    if !response.is_null() {
        ctx.print_value(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alarm_type() {
        assert_eq!(parse_alarm_type("gt"), Ok(AlarmType::Above));
        assert_eq!(parse_alarm_type("out_of_range"), Ok(AlarmType::OutOfRange));
        assert_eq!(parse_alarm_type("chg"), Ok(AlarmType::Change));
        assert!(parse_alarm_type("sideways").is_err());
    }

    #[test]
    fn test_alarm_config_validation() {
        assert!(alarm_config(AlarmType::Above, None, None).is_err());
        assert!(alarm_config(AlarmType::InRange, Some(5.0), None).is_err());
        assert!(alarm_config(AlarmType::InRange, Some(5.0), Some(1.0)).is_err());
        assert_eq!(
            alarm_config(AlarmType::InRange, Some(1.0), Some(5.0)).unwrap(),
            AlarmConfig::range(AlarmType::InRange, 1.0, 5.0)
        );
        assert_eq!(
            alarm_config(AlarmType::Change, Some(3.0), None).unwrap(),
            AlarmConfig::on_change()
        );
    }
}
