// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Top-level error response envelope, shared by the Router and Agent HTTP surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with a machine-readable code and a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// `GET /health` response shared by both processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub sessions: usize,
}

// -- Edge Router HTTP DTOs ----------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSessionRequest {
    pub session_id: String,
    pub machine_id: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSessionView {
    pub session_id: String,
    pub machine_id: String,
    pub label: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendNotificationRequest {
    pub session_id: String,
    pub chat_id: String,
    pub text: String,
    /// Token minted by the Agent's Registry for this notification's free-form
    /// `/cmd <TOKEN> <text>` / direct `<TOKEN> <text>` reply shapes. The Router
    /// mirrors the binding so it can route without a synchronous round trip
    /// back to the Agent (see DESIGN.md, "Router-side reply-token mirror").
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub reply_token_ttl_secs: Option<i64>,
    #[serde(default)]
    pub reply_markup: Option<ReplyMarkup>,
}

/// Inline-keyboard markup: one row of buttons, each bound to its own
/// Agent-minted reply-token so a callback tap alone routes and validates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyMarkup {
    pub buttons: Vec<ReplyButton>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyButton {
    pub label: String,
    pub action: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendNotificationResponse {
    pub message_id: String,
}

// -- Machine Agent local HTTP DTOs --------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartRequest {
    pub session_id: String,
    #[serde(default)]
    pub ppid: Option<i32>,
    #[serde(default)]
    pub pid: Option<i32>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub notify: Option<bool>,
    #[serde(default)]
    pub transport: Option<TransportDescriptorDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransportDescriptorDto {
    TerminalEditorRpc {
        socket_path: String,
        buffer_identifier: String,
        #[serde(default)]
        fallback_pane_identifier: Option<String>,
    },
    TerminalMultiplexer {
        pane_identifier: String,
        #[serde(default)]
        session_name: Option<String>,
    },
    PseudoTerminal {
        device_path: String,
    },
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub session_id: String,
    pub event: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub ok: bool,
    pub notified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnableNotifyRequest {
    pub session_id: String,
    pub label: String,
    #[serde(default)]
    pub transport: Option<TransportDescriptorDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub label: Option<String>,
    pub notify: bool,
    pub state: String,
    pub cwd: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenValidateRequest {
    pub token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}
