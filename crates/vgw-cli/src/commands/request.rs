//! Request commands - raw GET/PUT/POST/DELETE and endpoint reads

use anyhow::{bail, Context, Result};
use serde_json::Value;
use vgw_client::{CallOutcome, GatewayClient, Method};

use crate::output::{format_json_value, OutputContext, ValueRow};

/// Send one request and print the response
pub async fn request(
    client: &GatewayClient,
    method: Method,
    path: &str,
    body: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    let body = body.map(parse_value).transpose()?;

    match client.call(method, path, body).await {
        CallOutcome::Success(value) => ctx.print_value(&value),
        CallOutcome::JsonParseError { raw, error } => {
            ctx.warn(&format!("Response is not JSON ({})", error));
            println!("{}", raw);
        }
        CallOutcome::Failure(e) => bail!("{} {} failed: {}", method, path, e),
    }
    Ok(())
}

/// Read the current value of each endpoint
pub async fn read(client: &GatewayClient, endpoints: &[String], ctx: &OutputContext) -> Result<()> {
    let mut rows = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let value = client
            .read_value(endpoint)
            .await
            .with_context(|| format!("Failed to read {}", endpoint))?;

        // Gateways answer either a bare value or {"value": ...}
        let value = match &value {
            Value::Object(map) => map.get("value").unwrap_or(&value),
            other => other,
        };
        rows.push(ValueRow {
            endpoint: endpoint.clone(),
            value: format_json_value(value),
        });
    }

    ctx.print(&rows);
    Ok(())
}

/// Interpret a command-line value: JSON when it looks like JSON, then
/// numbers, else a plain string
pub fn parse_value(value: &str) -> Result<Value> {
    let parsed = if value.starts_with('{')
        || value.starts_with('[')
        || value == "true"
        || value == "false"
        || value == "null"
    {
        serde_json::from_str(value).context("Failed to parse value as JSON")?
    } else if let Ok(num) = value.parse::<i64>() {
        Value::Number(num.into())
    } else if let Ok(num) = value.parse::<f64>() {
        serde_json::Number::from_f64(num)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()))
    } else {
        Value::String(value.to_string())
    };
    Ok(parsed)
}
