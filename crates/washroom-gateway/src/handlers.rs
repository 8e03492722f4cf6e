// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! HTTP request handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use washroom::endpoint::ActuatorAction;
use washroom::{DeviceEvent, DeviceKind, DeviceSnapshot, ErrorCode, ErrorDetails};

use crate::AppState;

/// Structured error body mirroring the fabric's closed taxonomy.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub metadata: std::collections::BTreeMap<String, String>,
}

impl From<ErrorDetails> for ApiError {
    fn from(details: ErrorDetails) -> Self {
        Self {
            code: details.code.to_string(),
            message: details.message,
            metadata: details.metadata,
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "DEVICE_NOT_FOUND" => StatusCode::NOT_FOUND,
            "INVALID_COMMAND" | "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "DEVICE_OFFLINE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// GET /healthz
pub async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "Healthy" }))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// `sensor` or `actuator`.
    pub kind: Option<String>,
    /// Case-insensitive substring of the device name.
    pub name: Option<String>,
}

/// GET /api/v1/devices
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<DeviceSnapshot>>, ApiError> {
    let kind = match params.kind.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<DeviceKind>().map_err(|_| {
            ApiError::from(
                ErrorDetails::new(
                    ErrorCode::ValidationError,
                    format!("unknown device kind {raw:?}"),
                )
                .with_metadata("kind", raw),
            )
        })?),
    };

    let devices = state
        .registry
        .list_devices(kind, params.name.as_deref())
        .await;
    Ok(Json(devices))
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub message: String,
}

/// POST /api/v1/devices/:device_id/command
pub async fn send_command(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Json(action): Json<ActuatorAction>,
) -> Result<Json<CommandResponse>, ApiError> {
    let message = state
        .registry
        .send_actuator_command(&device_id, action)
        .await?;
    Ok(Json(CommandResponse { message }))
}

/// GET /api/v1/events
///
/// One SSE event per registry change; the data field is the
/// base64-encoded binary snapshot. A subscriber that falls behind the
/// bounded buffer receives a single `resync` event instead of the dropped
/// backlog - its cue to re-list.
pub async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.registry.subscribe();
    let stream =
        BroadcastStream::new(receiver).map(|item| Ok::<_, Infallible>(sse_event(item)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(item: Result<DeviceEvent, BroadcastStreamRecvError>) -> Event {
    match item {
        Ok(event) => match encode_snapshot(&event) {
            Ok(data) => Event::default().event(event.name()).data(data),
            Err(e) => {
                warn!("failed to encode event snapshot: {e}");
                Event::default().event("resync").data("")
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "event subscriber lagged, telling it to resync");
            Event::default().event("resync").data("")
        }
    }
}

fn encode_snapshot(event: &DeviceEvent) -> Result<String, bincode::Error> {
    Ok(BASE64.encode(bincode::serialize(event.snapshot())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use washroom::types::{DeviceCategory, DeviceStatus, TransportProtocol};

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ErrorCode::DeviceNotFound, StatusCode::NOT_FOUND),
            (ErrorCode::InvalidCommand, StatusCode::BAD_REQUEST),
            (ErrorCode::ValidationError, StatusCode::BAD_REQUEST),
            (ErrorCode::DeviceOffline, StatusCode::SERVICE_UNAVAILABLE),
            (ErrorCode::UnknownError, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, status) in cases {
            let api: ApiError = ErrorDetails::new(code, "x").into();
            assert_eq!(api.status(), status, "{code}");
        }
    }

    #[test]
    fn test_snapshot_survives_base64_framing() {
        let snapshot = DeviceSnapshot {
            id: "Sink._sink._tcp.local.".into(),
            device_name: "Sink".into(),
            kind: DeviceKind::Actuator,
            category: DeviceCategory::Sink,
            transport: TransportProtocol::Tcp,
            port: 4020,
            addresses: vec!["192.168.1.7".into()],
            properties: BTreeMap::new(),
            status: DeviceStatus::Online,
            expires_in_secs: 4500,
        };
        let event = DeviceEvent::Added(snapshot.clone());

        let encoded = encode_snapshot(&event).unwrap();
        let decoded: DeviceSnapshot =
            bincode::deserialize(&BASE64.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_command_action_json_shape() {
        // The HTTP body for a lamp command, as the UI sends it.
        let body = r#"{"light_lamp":{"turn_on":true,"brightness":75,"color":null}}"#;
        let action: ActuatorAction = serde_json::from_str(body).unwrap();
        match action {
            ActuatorAction::LightLamp(lamp) => {
                assert_eq!(lamp.turn_on, Some(true));
                assert_eq!(lamp.brightness, Some(75));
            }
            other => panic!("expected lamp action, got {other:?}"),
        }
    }
}
