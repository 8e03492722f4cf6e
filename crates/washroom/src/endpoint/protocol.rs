// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Device request/response protocol.
//!
//! Carried over per-connection TCP with the shared length-prefix framing
//! (see [`crate::wire`]). One request, one response, pipelining on the
//! same connection allowed.

use serde::{Deserialize, Serialize};

use crate::error::ErrorDetails;
use crate::types::DeviceKind;

/// A request to a device endpoint (or, via the gateway, to the fabric).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRequest {
    Empty,
    ListDevices {
        kind: Option<DeviceKind>,
        name: Option<String>,
    },
    SendActuatorCommand {
        device_id: String,
        action: ActuatorAction,
    },
}

/// Actuator command payloads. A device only understands the arm matching
/// its own category; anything else earns an `InvalidCommand` error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorAction {
    LightLamp(LightLampAction),
    Sink(SinkAction),
}

impl ActuatorAction {
    /// Short label for error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LightLamp(_) => "light_lamp",
            Self::Sink(_) => "sink",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightLampAction {
    pub turn_on: Option<bool>,
    pub brightness: Option<u32>,
    /// 24-bit RGB value.
    pub color: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkAction {
    pub turn_on: Option<bool>,
}

/// A device endpoint's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceResponse {
    Empty,
    Error(ErrorDetails),
    SendActuatorCommand(SendActuatorCommandResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendActuatorCommandResponse {
    /// Human-readable description of what changed.
    pub message: String,
}

impl DeviceResponse {
    pub fn command_ok(message: impl Into<String>) -> Self {
        Self::SendActuatorCommand(SendActuatorCommandResponse {
            message: message.into(),
        })
    }

    pub fn error(details: ErrorDetails) -> Self {
        Self::Error(details)
    }
}
