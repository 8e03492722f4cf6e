// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Light lamp actuator daemon.

use std::collections::BTreeMap;

use clap::Parser;

use washroom::endpoint::{
    ActuatorAction, DeviceHandler, DeviceRequest, DeviceResponse, HandlerOutcome,
};
use washroom::error::ErrorDetails;
use washroom::types::{DeviceCategory, DeviceKind, ServiceInfo};
use washroom_devices::{init_tracing, run_device, SensorSim};

/// Washroom light lamp device
#[derive(Parser, Debug)]
#[command(name = "lightlamp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

struct LightLamp;

impl DeviceHandler for LightLamp {
    fn handle(&mut self, request: &DeviceRequest, info: &mut ServiceInfo) -> HandlerOutcome {
        let action = match request {
            DeviceRequest::SendActuatorCommand {
                action: ActuatorAction::LightLamp(action),
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

        if action.turn_on == Some(true) && is_on != "true" {
            info.properties.insert("is_on".into(), "true".into());
            message.push_str("Light turned ON. ");
        }
        if action.turn_on == Some(false) && is_on == "true" {
            info.properties.insert("is_on".into(), "false".into());
            message.push_str("Light turned OFF. ");
        }
        if let Some(brightness) = action.brightness {
            let text = brightness.to_string();
            if info.properties.get("brightness") != Some(&text) {
                info.properties.insert("brightness".into(), text);
                message.push_str(&format!("Brightness set to {brightness}. "));
            }
        }
        if let Some(color) = action.color {
            let text = color.to_string();
            if info.properties.get("color") != Some(&text) {
                info.properties.insert("color".into(), text);
                message.push_str(&format!("Color set to #{color:06X}. "));
            }
        }
        if message.is_empty() {
            message.push_str("No change.");
        }

        HandlerOutcome::announce(DeviceResponse::command_ok(message.trim()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let mut properties = BTreeMap::new();
    properties.insert("is_on".to_string(), "false".to_string());
    properties.insert("brightness".to_string(), "0".to_string());
    properties.insert("color".to_string(), "16777215".to_string());

    let info = ServiceInfo::new(
        "Light Lamp",
        DeviceCategory::LightLamp,
        DeviceKind::Actuator,
        properties,
    );

    run_device(info, LightLamp, None::<SensorSim<fn(&mut BTreeMap<String, String>) -> bool>>)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use washroom::endpoint::LightLampAction;

    fn lamp_info() -> ServiceInfo {
        let mut properties = BTreeMap::new();
        properties.insert("is_on".to_string(), "false".to_string());
        properties.insert("brightness".to_string(), "0".to_string());
        properties.insert("color".to_string(), "16777215".to_string());
        ServiceInfo::new(
            "Light Lamp",
            DeviceCategory::LightLamp,
            DeviceKind::Actuator,
            properties,
        )
    }

    fn command(action: LightLampAction) -> DeviceRequest {
        DeviceRequest::SendActuatorCommand {
            device_id: "Light Lamp._lightlamp._tcp.local.".into(),
            action: ActuatorAction::LightLamp(action),
        }
    }

    #[test]
    fn test_turn_on_with_brightness() {
        let mut info = lamp_info();
        let outcome = LightLamp.handle(
            &command(LightLampAction {
                turn_on: Some(true),
                brightness: Some(75),
                color: None,
            }),
            &mut info,
        );

        assert!(outcome.announce);
        assert_eq!(info.properties.get("is_on").unwrap(), "true");
        assert_eq!(info.properties.get("brightness").unwrap(), "75");
        match outcome.response {
            DeviceResponse::SendActuatorCommand(r) => {
                assert!(r.message.contains("Light turned ON"));
                assert!(r.message.contains("Brightness set to 75"));
            }
            other => panic!("expected command response, got {other:?}"),
        }
    }

    #[test]
    fn test_noop_command_reports_no_change() {
        let mut info = lamp_info();
        let outcome = LightLamp.handle(&command(LightLampAction::default()), &mut info);
        match outcome.response {
            DeviceResponse::SendActuatorCommand(r) => assert_eq!(r.message, "No change."),
            other => panic!("expected command response, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_category_action_is_invalid_command() {
        let mut info = lamp_info();
        let request = DeviceRequest::SendActuatorCommand {
            device_id: "x".into(),
            action: ActuatorAction::Sink(Default::default()),
        };
        let outcome = LightLamp.handle(&request, &mut info);
        assert!(!outcome.announce);
        assert!(matches!(outcome.response, DeviceResponse::Error(_)));
    }

    #[test]
    fn test_non_command_request_is_invalid_command() {
        let mut info = lamp_info();
        let outcome = LightLamp.handle(&DeviceRequest::Empty, &mut info);
        assert!(matches!(outcome.response, DeviceResponse::Error(_)));
    }
}
