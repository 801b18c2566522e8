//! Output formatting for vgw-cli (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{Table, Tabled};
use vgw_client::InboundEvent;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    let table = Table::new(data).to_string();
                    println!("{}", table);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => {
                print_csv(data);
            }
        }
    }

    /// Print a JSON response body
    pub fn print_value(&self, value: &Value) {
        match (self.format, value) {
            (OutputFormat::Table, Value::Object(map)) => {
                for (key, value) in map {
                    println!("{}: {}", key.bold(), format_json_value(value));
                }
            }
            (OutputFormat::Table, Value::Null) => {
                if !self.quiet {
                    println!("(empty response)");
                }
            }
            (OutputFormat::Table, other) => println!("{}", format_json_value(other)),
            (OutputFormat::Json, value) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
                );
            }
            (OutputFormat::Csv, Value::Object(map)) => {
                let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
                println!("{}", keys.join(","));
                let values: Vec<String> = map
                    .values()
                    .map(|v| escape_csv(&format_json_value(v)))
                    .collect();
                println!("{}", values.join(","));
            }
            (OutputFormat::Csv, other) => println!("{}", escape_csv(&format_json_value(other))),
        }
    }

    /// Print one stream event as a single line
    pub fn print_event(&self, event: &InboundEvent) {
        match self.format {
            OutputFormat::Table => {
                let kind = if event.category.is_alarm() {
                    event.category.to_string().yellow()
                } else {
                    event.category.to_string().cyan()
                };
                println!(
                    "[{}] #{} {} {} = {}",
                    event.timestamp.format("%H:%M:%S%.3f"),
                    event.sequence,
                    kind,
                    event.short_name.bold(),
                    event.value
                );
            }
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(event) {
                    println!("{}", json);
                }
            }
            OutputFormat::Csv => {
                let row = EventRow::from(event);
                let values = [
                    row.timestamp,
                    row.sequence,
                    row.category,
                    row.key,
                    row.short_name,
                    row.value,
                ];
                let values: Vec<String> = values.iter().map(|v| escape_csv(v)).collect();
                println!("{}", values.join(","));
            }
        }
    }

    /// Header line for a CSV event stream
    pub fn print_event_header(&self) {
        if self.format == OutputFormat::Csv {
            println!("timestamp,sequence,category,key,short_name,value");
        }
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T]) {
    if data.is_empty() {
        return;
    }

    // Get field names from the first item
    let first = serde_json::to_value(&data[0]).unwrap_or_default();
    if let Value::Object(map) = &first {
        let headers: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
        println!("{}", headers.join(","));

        for item in data {
            if let Ok(Value::Object(row)) = serde_json::to_value(item) {
                let values: Vec<String> = headers
                    .iter()
                    .map(|h| {
                        row.get(*h)
                            .map(|v| escape_csv(&format_json_value(v)))
                            .unwrap_or_default()
                    })
                    .collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Value display for read command
#[derive(Debug, Tabled, Serialize)]
pub struct ValueRow {
    #[tabled(rename = "Endpoint")]
    pub endpoint: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Fault code display for faults command
#[derive(Debug, Tabled, Serialize)]
pub struct FaultCodeRow {
    #[tabled(rename = "Bus")]
    pub bus: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "ECU")]
    pub ecu: String,
    #[tabled(rename = "Code")]
    pub code: String,
}

/// Stream event display for monitor command
#[derive(Debug, Tabled, Serialize)]
pub struct EventRow {
    #[tabled(rename = "Time")]
    pub timestamp: String,
    #[tabled(rename = "Seq")]
    pub sequence: String,
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Name")]
    pub short_name: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl From<&InboundEvent> for EventRow {
    fn from(event: &InboundEvent) -> Self {
        Self {
            timestamp: event.timestamp.to_rfc3339(),
            sequence: event.sequence.to_string(),
            category: event.category.to_string(),
            key: event.routing_key.to_string(),
            short_name: event.short_name.clone(),
            value: event.value.to_string(),
        }
    }
}
