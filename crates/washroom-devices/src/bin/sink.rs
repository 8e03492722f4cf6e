// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Sink actuator daemon. Consumes water while running.

use std::collections::BTreeMap;
use std::time::Duration;

use clap::Parser;

use washroom::endpoint::{
    ActuatorAction, DeviceHandler, DeviceRequest, DeviceResponse, HandlerOutcome,
};
use washroom::error::ErrorDetails;
use washroom::types::{DeviceCategory, DeviceKind, ServiceInfo};
use washroom_devices::{init_tracing, run_device, SensorSim};

/// Litres added per consumption tick while the sink is running.
const LITRES_PER_TICK: u64 = 5;

/// Washroom sink device
#[derive(Parser, Debug)]
#[command(name = "sink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

struct Sink;

impl DeviceHandler for Sink {
    fn handle(&mut self, request: &DeviceRequest, info: &mut ServiceInfo) -> HandlerOutcome {
        let action = match request {
            DeviceRequest::SendActuatorCommand {
                action: ActuatorAction::Sink(action),
                ..
            } => action,
            DeviceRequest::SendActuatorCommand { action, .. } => {
                return HandlerOutcome::reply(DeviceResponse::error(
                    ErrorDetails::invalid_command(format!(
                        "unsupported actuator command type: {}",
                        action.label()
                    ))
                    .with_metadata("action", action.label()),
                ));
            }
            _ => {
                return HandlerOutcome::reply(DeviceResponse::error(
                    ErrorDetails::invalid_command("unsupported request type"),
                ));
            }
        };

        let mut message = String::new();
        let is_on = info.properties.get("is_on").cloned().unwrap_or_default();

        match (action.turn_on, is_on.as_str()) {
            (Some(true), "true") => message.push_str("Sink already ON. "),
            (Some(true), _) => {
                info.properties.insert("is_on".into(), "true".into());
                message.push_str("Sink turned ON. ");
            }
            (Some(false), "true") => {
                info.properties.insert("is_on".into(), "false".into());
                message.push_str("Sink turned OFF. ");
            }
            _ => {}
        }

        if message.is_empty() {
            message.push_str("No change.");
        }

        HandlerOutcome::announce(DeviceResponse::command_ok(message.trim()))
    }
}

/// While the sink runs, water keeps flowing.
fn consume_water(properties: &mut BTreeMap<String, String>) -> bool {
    if properties.get("is_on").map(String::as_str) != Some("true") {
        return false;
    }

    let consumed: u64 = properties
        .get("water_consumed_in_litters")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let consumed = consumed + LITRES_PER_TICK;
    properties.insert("water_consumed_in_litters".into(), consumed.to_string());
    tracing::info!(litres = consumed, "water consumed");
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let mut properties = BTreeMap::new();
    properties.insert("is_on".to_string(), "false".to_string());
    properties.insert("water_consumed_in_litters".to_string(), "0".to_string());

    let info = ServiceInfo::new("Sink", DeviceCategory::Sink, DeviceKind::Actuator, properties);

    run_device(
        info,
        Sink,
        Some(SensorSim {
            interval: Duration::from_secs(3),
            tick: consume_water,
        }),
    )
    .await
}
