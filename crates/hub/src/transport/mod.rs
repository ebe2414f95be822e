// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the Edge Router.

pub mod auth;
pub mod duplex;
pub mod http;
pub mod webhook;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::RouterState;

pub fn build_router(state: Arc<RouterState>) -> Router {
    let webhook_path = match state.config.webhook_path_secret.as_deref() {
        Some(secret) => format!("/webhook/{secret}"),
        None => "/webhook".to_owned(),
    };

    Router::new()
        .route("/health", get(http::health))
        .route("/sessions", post(http::register_session).get(http::list_sessions))
        .route("/sessions/unregister", post(http::unregister_session))
        .route("/notifications", post(http::send_notification))
        .route("/cleanup", post(http::cleanup))
        .route("/duplex", get(duplex::duplex_handler))
        .route(&webhook_path, post(webhook::webhook_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
