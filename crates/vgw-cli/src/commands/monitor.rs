//! Monitor command - print events from the gateway stream

use anyhow::{anyhow, bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use vgw_client::{
    CategoryFilter, ChannelState, Delivery, EventListener, FaultCodeKey, GatewayClient,
    InboundEvent, RoutingKey, SubscriptionConfig,
};

use crate::output::OutputContext;

pub struct MonitorOptions {
    pub endpoints: Vec<String>,
    pub faults: Vec<FaultCodeKey>,
    pub filter: CategoryFilter,
    /// Ask the gateway to stream each endpoint before listening
    pub configure: Option<SubscriptionConfig>,
}

/// Listen on the event stream until Ctrl+C or the gateway closes it
pub async fn monitor(client: &GatewayClient, options: MonitorOptions, ctx: &OutputContext) -> Result<()> {
    if options.endpoints.is_empty() && options.faults.is_empty() {
        bail!("Nothing to monitor: give at least one endpoint or --fault");
    }

    // Listener runs on the read loop; hand events over to this task for printing
    let (tx, mut rx) = mpsc::unbounded_channel::<InboundEvent>();
    let forward = move |event: &InboundEvent| -> anyhow::Result<()> {
        tx.send(event.clone())
            .map_err(|_| anyhow!("monitor output closed"))
    };
    let listener: Arc<dyn EventListener> = Arc::new(forward);

    for endpoint in &options.endpoints {
        client.subscribe_with(
            RoutingKey::endpoint(endpoint),
            options.filter,
            listener.clone(),
            Delivery::Immediate,
        );
    }
    for key in &options.faults {
        client.subscribe_with(key.clone(), options.filter, listener.clone(), Delivery::Immediate);
    }

    client
        .connect()
        .await
        .context("Failed to connect to event stream")?;
    if let Some(info) = client.channel_info() {
        ctx.info(&format!("Connected to {}:{}", info.host, info.port));
    }

    if let Some(config) = &options.configure {
        for endpoint in &options.endpoints {
            client
                .configure_subscription(endpoint, config)
                .await
                .with_context(|| format!("Failed to configure subscription for {}", endpoint))?;
        }
    }

    ctx.info("Press Ctrl+C to stop");
    ctx.print_event_header();

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => ctx.print_event(&event),
                None => break,
            },
            _ = tokio::time::sleep(tokio::time::Duration::from_millis(100)) => {
                // Check running flag and channel state periodically
                if client.state() != ChannelState::Connected {
                    ctx.error("Event stream ended");
                    break;
                }
            }
        }
    }

    if let Some(stats) = client.sequence_stats() {
        if stats.gaps > 0 || stats.regressions > 0 {
            ctx.warn(&format!(
                "Sequence anomalies: {} gap(s), {} regression(s)",
                stats.gaps, stats.regressions
            ));
        }
    }

    ctx.info("\nDisconnecting...");
    client.disconnect(true).await;
    ctx.success("Disconnected");

    Ok(())
}
