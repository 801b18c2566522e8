//! VGW CLI - Command-line tool for vehicle gateways
//!
//! Monitors the gateway event stream and issues request/response calls
//! against its HTTP API.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vgw_client::{AlarmType, CategoryFilter, FaultCodeKey, GatewayClient, Method};

use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "vgw-cli")]
#[command(author, version, about = "Vehicle Gateway CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Gateway host for the event stream
    #[arg(long, env = "VGW_HOST")]
    host: Option<String>,

    /// Event stream TCP port
    #[arg(short, long, env = "VGW_EVENT_PORT")]
    port: Option<u16>,

    /// Base URL of the gateway HTTP API
    #[arg(short, long, env = "VGW_API_URL")]
    api: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "VGW_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print events from the gateway stream until Ctrl+C
    Monitor {
        /// Data endpoint(s) to listen on, e.g. vehicle/engine/speed
        endpoints: Vec<String>,

        /// Fault-code URI(s) to listen on, e.g. vehicle/dtc/can0_active/ecu0
        #[arg(long = "fault", value_name = "URI")]
        faults: Vec<FaultCodeKey>,

        /// Which event categories to show
        #[arg(long, value_enum, default_value = "any")]
        only: EventKind,

        /// Also ask the gateway to stream the endpoints
        #[arg(long)]
        configure: bool,

        /// Stream interval used with --configure
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// Read the current value of data endpoint(s)
    Read {
        /// Data endpoint(s)
        #[arg(required = true)]
        endpoints: Vec<String>,
    },

    /// Send a GET request
    Get {
        /// Path relative to the API base URL
        path: String,
    },

    /// Send a PUT request
    Put {
        /// Path relative to the API base URL
        path: String,

        /// Body (JSON, number or string)
        body: String,
    },

    /// Send a POST request
    Post {
        /// Path relative to the API base URL
        path: String,

        /// Body (JSON, number or string)
        body: String,
    },

    /// Send a DELETE request
    Delete {
        /// Path relative to the API base URL
        path: String,
    },

    /// Ask the gateway to stream an endpoint
    Subscribe {
        endpoint: String,

        /// Minimum interval between events
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Only emit when the value changes
        #[arg(long)]
        on_change: bool,
    },

    /// Stop streaming an endpoint
    Unsubscribe { endpoint: String },

    /// Configure alarm conditions
    Alarm {
        #[command(subcommand)]
        command: AlarmCommand,
    },

    /// Read fault codes reported by an ECU
    Faults {
        /// Bus name, e.g. can0
        bus: String,

        /// ECU name, e.g. ecu0
        ecu: String,

        /// Read stored instead of active fault codes
        #[arg(long)]
        stored: bool,
    },
}

#[derive(Subcommand)]
enum AlarmCommand {
    /// Set or change an alarm
    Set {
        endpoint: String,

        /// Alarm type: above, below, equal, not_equal, in_range, out_of_range, change
        /// (or its suffix: gt, lt, eq, ne, in, out, chg)
        #[arg(value_parser = commands::parse_alarm_type)]
        alarm_type: AlarmType,

        /// Threshold, or lower bound for range alarms
        #[arg(long)]
        threshold: Option<f64>,

        /// Upper bound for range alarms
        #[arg(long)]
        upper: Option<f64>,
    },

    /// Remove an alarm
    Remove {
        endpoint: String,

        #[arg(value_parser = commands::parse_alarm_type)]
        alarm_type: AlarmType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EventKind {
    Any,
    Subscriptions,
    Alarms,
}

impl From<EventKind> for CategoryFilter {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Any => CategoryFilter::Any,
            EventKind::Subscriptions => CategoryFilter::Subscriptions,
            EventKind::Alarms => CategoryFilter::Alarms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.host.as_deref(),
        cli.port,
        cli.api.as_deref(),
        cli.no_color,
    );

    // Create output context
    let ctx = OutputContext::new(cli.output, merged.no_color, cli.quiet);

    debug!(config = ?merged.client, "Resolved gateway configuration");
    let client = GatewayClient::new(merged.client).context("Failed to create gateway client")?;

    // Execute command
    match cli.command {
        Commands::Monitor {
            endpoints,
            faults,
            only,
            configure,
            interval_ms,
        } => {
            let options = commands::MonitorOptions {
                endpoints,
                faults,
                filter: only.into(),
                configure: configure.then(|| vgw_client::SubscriptionConfig {
                    interval_ms: Some(interval_ms),
                    on_change: false,
                }),
            };
            commands::monitor(&client, options, &ctx).await?;
        }

        Commands::Read { endpoints } => {
            commands::read(&client, &endpoints, &ctx).await?;
        }

        Commands::Get { path } => {
            commands::request(&client, Method::Get, &path, None, &ctx).await?;
        }

        Commands::Put { path, body } => {
            commands::request(&client, Method::Put, &path, Some(&body), &ctx).await?;
        }

        Commands::Post { path, body } => {
            commands::request(&client, Method::Post, &path, Some(&body), &ctx).await?;
        }

        Commands::Delete { path } => {
            commands::request(&client, Method::Delete, &path, None, &ctx).await?;
        }

        Commands::Subscribe {
            endpoint,
            interval_ms,
            on_change,
        } => {
            commands::subscribe(&client, &endpoint, interval_ms, on_change, &ctx).await?;
        }

        Commands::Unsubscribe { endpoint } => {
            commands::unsubscribe(&client, &endpoint, &ctx).await?;
        }

        Commands::Alarm { command } => match command {
            AlarmCommand::Set {
                endpoint,
                alarm_type,
                threshold,
                upper,
            } => {
                commands::set_alarm(&client, &endpoint, alarm_type, threshold, upper, &ctx).await?;
            }
            AlarmCommand::Remove {
                endpoint,
                alarm_type,
            } => {
                commands::remove_alarm(&client, &endpoint, alarm_type, &ctx).await?;
            }
        },

        Commands::Faults { bus, ecu, stored } => {
            let key = if stored {
                FaultCodeKey::stored(bus, ecu)
            } else {
                FaultCodeKey::active(bus, ecu)
            };
            commands::faults(&client, &key, &ctx).await?;
        }
    }

    Ok(())
}
