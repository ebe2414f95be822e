// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::RouterError;
use crate::state::RouterState;

/// Constant-time string comparison, to close the auth-check timing side-channel.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate the `Authorization: Bearer <key>` header against the shared key.
pub fn validate_bearer(headers: &HeaderMap, expected: &str) -> Result<(), RouterError> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(RouterError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(RouterError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(RouterError::Unauthorized)
    }
}

/// Auth must be decided before a duplex upgrade is accepted, not after — this
/// is the security property the source's subprotocol-header workaround was
/// protecting, independent of which field the key travels in. Here it travels
/// in a normal `Authorization` header, since this edge is not constrained to
/// subprotocol-only auth the way the source's platform was.
pub fn validate_upgrade_bearer(headers: &HeaderMap, expected: &str) -> Result<(), RouterError> {
    validate_bearer(headers, expected)
}

/// Axum middleware enforcing Bearer auth on every route except health and webhook.
pub async fn auth_layer(
    state: State<Arc<RouterState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/health" || path.starts_with("/webhook") {
        return next.run(req).await;
    }
    if path.starts_with("/duplex") {
        if let Err(e) = validate_upgrade_bearer(req.headers(), &state.config.shared_api_key) {
            return e.into_response();
        }
        return next.run(req).await;
    }
    if let Err(e) = validate_bearer(req.headers(), &state.config.shared_api_key) {
        return e.into_response();
    }
    next.run(req).await
}
