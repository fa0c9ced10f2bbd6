// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Registry HTTP server wiring: metrics exporter, sweeper background task,
//! axum server with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use meridian_registry_core::application::registry::{RegistryConfig, RegistryService};
use meridian_registry_core::application::sweeper::{LivenessSweeper, SweeperConfig};
use meridian_registry_core::infrastructure::event_hub::{EventHub, HubConfig};
use meridian_registry_core::presentation::api;

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind the HTTP API to
    #[arg(long, env = "MERIDIAN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP API port
    #[arg(long, env = "MERIDIAN_PORT", default_value = "8700")]
    pub port: u16,

    /// Prometheus metrics exporter port (0 disables the exporter)
    #[arg(long, env = "MERIDIAN_METRICS_PORT", default_value = "9700")]
    pub metrics_port: u16,

    /// Seconds without a heartbeat before a tracked record is stale
    #[arg(long, env = "MERIDIAN_LIVENESS_WINDOW_SECS", default_value = "60")]
    pub liveness_window_secs: u64,

    /// Seconds between sweep cycles (0 disables the sweeper)
    #[arg(long, env = "MERIDIAN_SWEEP_INTERVAL_SECS", default_value = "15")]
    pub sweep_interval_secs: u64,

    /// Per-connection event queue capacity for execution streams
    #[arg(long, env = "MERIDIAN_QUEUE_CAPACITY", default_value = "64")]
    pub queue_capacity: usize,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    if args.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], args.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
            .context("Failed to install Prometheus metrics exporter")?;
        info!("Metrics exporter listening on {}", metrics_addr);
    }

    let registry = Arc::new(RegistryService::new(RegistryConfig {
        liveness_window: Duration::from_secs(args.liveness_window_secs),
    }));
    let hub = Arc::new(EventHub::new(HubConfig {
        subscriber_queue_capacity: args.queue_capacity,
    }));

    let sweeper = Arc::new(LivenessSweeper::new(
        Arc::clone(&registry),
        SweeperConfig {
            interval: Duration::from_secs(args.sweep_interval_secs.max(1)),
            enabled: args.sweep_interval_secs != 0,
        },
    ));
    let sweeper_token = sweeper.shutdown_token();
    let sweeper_handle = Arc::clone(&sweeper).start();

    let app = api::app(Arc::clone(&registry), Arc::clone(&hub));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Registry listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    sweeper_token.cancel();
    sweeper_handle
        .await
        .context("Sweeper task panicked during shutdown")?;

    info!("Registry shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
