// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Route table.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::AppState;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/v1/devices", get(handlers::list_devices))
        .route(
            "/api/v1/devices/:device_id/command",
            post(handlers::send_command),
        )
        .route("/api/v1/events", get(handlers::events))
}
