// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Error types.
//!
//! Two layers: internal errors per subsystem (wire framing, discovery,
//! device endpoint) and the closed [`ErrorCode`] taxonomy surfaced to
//! clients on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::MAX_FRAME_LEN;

/// Closed error taxonomy surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    UnknownError,
    DeviceNotFound,
    InvalidCommand,
    DeviceOffline,
    ValidationError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::DeviceNotFound => "DEVICE_NOT_FOUND",
            Self::InvalidCommand => "INVALID_COMMAND",
            Self::DeviceOffline => "DEVICE_OFFLINE",
            Self::ValidationError => "VALIDATION_ERROR",
        };
        f.write_str(s)
    }
}

/// A structured error as carried on the wire and surfaced through the
/// gateway API. Metadata is free-form key/value context (for example the
/// address a failed command dispatch attempted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ErrorDetails {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn device_not_found(device_id: &str) -> Self {
        Self::new(
            ErrorCode::DeviceNotFound,
            format!("device {device_id} is not registered"),
        )
        .with_metadata("device_id", device_id)
    }

    pub fn invalid_command(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidCommand, message)
    }

    pub fn device_offline(device_id: &str, address: &str) -> Self {
        Self::new(
            ErrorCode::DeviceOffline,
            format!("device {device_id} is unreachable"),
        )
        .with_metadata("device_id", device_id)
        .with_metadata("address", address)
    }
}

/// Framing/codec errors for the length-prefixed binary protocols.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("frame of {0} bytes exceeds the {max} byte limit", max = MAX_FRAME_LEN)]
    FrameTooLarge(usize),

    #[error("length prefix claims {declared} bytes but payload has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("datagram too short for a length prefix")]
    MissingPrefix,

    #[error("codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for WireError {
    fn from(err: bincode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Errors from the discovery engine's public operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("service {fqdn} cannot use port 0")]
    InvalidPort { fqdn: String },

    #[error("name {name} is already claimed and renaming is disallowed")]
    NameConflict { name: String },

    #[error("could not find a free name for {name} after {attempts} renames")]
    RenameBudgetExhausted { name: String, attempts: u32 },

    #[error("service {fqdn} is not registered")]
    NotRegistered { fqdn: String },

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from a device endpoint's accept loop and connections.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the registry's device-facing I/O during command dispatch.
///
/// Probe failures never show up here: a failed probe is state-machine
/// signal, not an error.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("device address {address:?} is not dialable")]
    BadAddress { address: String },

    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {address} timed out")]
    ConnectTimeout { address: String },

    #[error("no response from {address}")]
    NoResponse { address: String },

    #[error("response from {address} timed out")]
    ResponseTimeout { address: String },

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Fatal startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid port value {value:?} (expected a 16-bit unsigned integer)")]
    InvalidPort { value: String },

    #[error("environment: {0}")]
    Env(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::DeviceOffline.to_string(), "DEVICE_OFFLINE");
        assert_eq!(ErrorCode::InvalidCommand.to_string(), "INVALID_COMMAND");
    }

    #[test]
    fn test_error_details_metadata() {
        let err = ErrorDetails::device_offline("Sink._sink._tcp.local.", "10.0.0.7:4020");
        assert_eq!(err.code, ErrorCode::DeviceOffline);
        assert_eq!(err.metadata.get("address").unwrap(), "10.0.0.7:4020");
    }

    #[test]
    fn test_error_details_roundtrip() {
        let err = ErrorDetails::invalid_command("unsupported action").with_metadata("field", "x");
        let bytes = bincode::serialize(&err).unwrap();
        let back: ErrorDetails = bincode::deserialize(&bytes).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn test_registry_error_names_the_address() {
        let err = RegistryError::ConnectTimeout {
            address: "10.0.0.7:4020".into(),
        };
        assert!(err.to_string().contains("10.0.0.7:4020"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidPort {
            value: "70000".into(),
        };
        assert!(err.to_string().contains("70000"));
    }
}
