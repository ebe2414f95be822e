// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local HTTP + duplex WebSocket transport for the Machine Agent.

pub mod duplex;
pub mod http;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AgentState;

pub fn build_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/session-start", post(http::session_start))
        .route("/stop", post(http::stop))
        .route("/sessions/enable-notify", post(http::enable_notify))
        .route("/sessions", get(http::list_sessions))
        .route("/sessions/{id}", get(http::get_session).delete(http::delete_session))
        .route("/sessions/{id}/heartbeat", post(http::heartbeat))
        .route("/tokens/validate", post(http::validate_token))
        .route("/cleanup", post(http::cleanup))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
