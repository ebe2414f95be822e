// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_wire::http::{ErrorBody, ErrorResponse};
use thiserror::Error;

/// Error taxonomy for the Edge Router's HTTP and webhook surfaces.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("session not found")]
    SessionNotFound,
    #[error("session limit reached")]
    SessionLimitReached,
    #[error("queue full")]
    QueueFull,
    #[error("command too long")]
    CommandTooLong,
    #[error("chat platform error: {0}")]
    ChatPlatform(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::CommandTooLong => StatusCode::BAD_REQUEST,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::SessionLimitReached | Self::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            Self::ChatPlatform(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionLimitReached => "SESSION_LIMIT_REACHED",
            Self::QueueFull => "QUEUE_FULL",
            Self::CommandTooLong => "COMMAND_TOO_LONG",
            Self::ChatPlatform(_) => "CHAT_PLATFORM_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = ErrorResponse { error: ErrorBody { code: self.code().to_owned(), message: self.to_string() } };
        (status, Json(body)).into_response()
    }
}
