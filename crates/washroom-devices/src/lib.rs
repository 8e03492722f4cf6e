// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Shared runtime for washroom device daemons.
//!
//! A device process is one TCP endpoint plus one embedded discovery
//! engine. This module owns the common choreography: pick a port, bind,
//! register (tiebreaking included), serve connections, optionally run a
//! sensor simulation timer, and on shutdown drain connections and say
//! goodbye.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use washroom::endpoint::{
    self, shared_device, DeviceHandler, DeviceRequest, DeviceResponse, HandlerOutcome,
};
use washroom::error::ConfigError;
use washroom::types::ServiceInfo;
use washroom::{DiscoveryConfig, DiscoveryEngine};

/// Environment variable overriding the listener port.
pub const PORT_ENV: &str = "PORT";

/// Initialize logging from a `--log-level` style string.
pub fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let level = match log_level {
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
    Ok(())
}

/// Resolve the listener port: `PORT` env override, else 0 (the OS picks an
/// ephemeral port at bind time). A set-but-invalid value is a fatal
/// startup error.
pub fn resolve_port() -> Result<u16, ConfigError> {
    match std::env::var(PORT_ENV) {
        Ok(raw) => raw
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort { value: raw }),
        Err(std::env::VarError::NotPresent) => Ok(0),
        Err(e) => Err(ConfigError::Env(e.to_string())),
    }
}

/// A sensor simulation: every `interval`, mutate the properties; return
/// `true` to re-announce them.
pub struct SensorSim<S> {
    pub interval: Duration,
    pub tick: S,
}

/// Handler for pure sensors: they accept connections but every request is
/// answered with an empty response and state never changes.
pub struct SensorHandler;

impl DeviceHandler for SensorHandler {
    fn handle(&mut self, _request: &DeviceRequest, _info: &mut ServiceInfo) -> HandlerOutcome {
        HandlerOutcome::reply(DeviceResponse::Empty)
    }
}

/// Run one device to completion (ctrl-c / SIGTERM).
pub async fn run_device<H, S>(
    mut info: ServiceInfo,
    handler: H,
    sensor: Option<SensorSim<S>>,
) -> anyhow::Result<()>
where
    H: DeviceHandler,
    S: FnMut(&mut BTreeMap<String, String>) -> bool + Send + 'static,
{
    let port = resolve_port()?;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding device listener on port {port}"))?;
    info.port = listener.local_addr()?.port();

    info!(
        service = %info.fqdn(),
        port = info.port,
        "starting {} service",
        info.category
    );

    let engine = DiscoveryEngine::start(DiscoveryConfig::default())?;
    let committed = engine.register(info).await?;
    let fqdn = committed.fqdn();

    let device = shared_device(committed, handler);
    let shutdown = Arc::new(Notify::new());

    let server = tokio::spawn(endpoint::serve(
        listener,
        engine.clone(),
        device.clone(),
        shutdown.clone(),
    ));

    let sensor_task = sensor.map(|SensorSim { interval, mut tick }| {
        let device = device.clone();
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = timer.tick() => {
                        // Hold the device lock across the announce so sensor
                        // ticks and command applies broadcast in commit order.
                        let mut guard = device.lock().await;
                        if tick(&mut guard.info.properties) {
                            let info = guard.info.clone();
                            if let Err(e) = engine.update(info).await {
                                tracing::warn!("sensor update failed: {e}");
                            }
                        }
                    }
                }
            }
        })
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received, cleaning up");

    // Stop accepting and let in-flight connections drain, then say goodbye.
    shutdown.notify_waiters();
    let _ = server.await;
    if let Some(task) = sensor_task {
        let _ = task.await;
    }

    if let Err(e) = engine.unregister(&fqdn).await {
        tracing::warn!("unregister failed: {e}");
    }
    engine.shutdown().await;
    info!("service stopped");
    Ok(())
}
