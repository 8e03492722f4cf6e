// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Washroom Gateway
//!
//! Listens to the discovery fabric, keeps the authoritative registry of
//! known devices and exposes it over HTTP:
//!
//! - `GET /healthz` - liveness
//! - `GET /api/v1/devices?kind=&name=` - list/filter known devices
//! - `POST /api/v1/devices/:id/command` - dispatch an actuator command
//! - `GET /api/v1/events` - SSE stream of registry change events
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port (8000)
//! washroom-gateway
//!
//! # Custom bind and faster liveness probing
//! washroom-gateway --bind 0.0.0.0 --port 9000 --probe-interval 15
//! ```

mod handlers;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use washroom::discovery::SERVICE_DISCOVERY_NAME;
use washroom::{DeviceRegistry, DiscoveryConfig, DiscoveryEngine, RegistryConfig};

/// Washroom Gateway - queryable, controllable registry of LAN devices
#[derive(Parser, Debug)]
#[command(name = "washroom-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP server port
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Liveness probe / expiry sweep interval in seconds
    #[arg(long, default_value = "60")]
    probe_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Shared application state handed to every handler.
pub struct AppState {
    pub registry: DeviceRegistry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Washroom Gateway v{}", env!("CARGO_PKG_VERSION"));

    // The gateway's engine is a pure listener: it registers nothing.
    let engine = DiscoveryEngine::start(DiscoveryConfig::default())?;
    let inbound = engine.subscribe_inbound();

    let registry = DeviceRegistry::new(RegistryConfig {
        probe_interval: Duration::from_secs(args.probe_interval),
        ..Default::default()
    });
    registry.run(inbound);

    // Ask the fabric to introduce itself so a late-starting gateway does
    // not wait out the devices' renewal cadence.
    engine.query(SERVICE_DISCOVERY_NAME).await?;

    let state = Arc::new(AppState {
        registry: registry.clone(),
    });

    let app = routes::api_routes()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server: http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await?;

    registry.shutdown();
    engine.shutdown().await;
    info!("gateway stopped");
    Ok(())
}
