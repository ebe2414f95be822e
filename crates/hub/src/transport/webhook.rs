// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound chat-platform webhook: one endpoint, fanning into the routing
//! algorithm that resolves a reply to the machine and session it targets.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use relay_wire::RouterFrame;
use teloxide::types::{Update, UpdateKind};

use crate::state::{db_blocking, RouterState};
use crate::store::TokenValidation;

const SECRET_HEADER: &str = "x-webhook-secret";

/// Outcome of classifying an inbound update into one of the four reply shapes.
enum Classified {
    ButtonCallback { token: String, chat_id: String },
    FreeForm { token: String, text: String, chat_id: String },
    ReplyTo { message_id: String, text: String, chat_id: String },
    Unrecognized,
}

pub async fn webhook_handler(
    State(state): State<Arc<RouterState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let secret = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()).unwrap_or("");
    if secret != state.config.webhook_secret {
        return StatusCode::UNAUTHORIZED;
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::debug!(err = %e, "webhook payload did not parse as an update, dropping");
            return StatusCode::OK;
        }
    };

    let update_id = update.id.0.to_string();
    let dedup = db_blocking(&state, move |s| s.seen.record_if_new(&update_id)).await;
    match dedup {
        Ok(true) => {}
        Ok(false) => return StatusCode::OK,
        Err(e) => {
            tracing::warn!(err = %e, "seen-update dedup check failed");
            return StatusCode::OK;
        }
    }

    if let Err(e) = route_update(&state, update).await {
        tracing::warn!(err = %e, "failed to route webhook update");
    }

    StatusCode::OK
}

async fn route_update(state: &Arc<RouterState>, update: Update) -> anyhow::Result<()> {
    let Some(classified) = classify(&update) else { return Ok(()) };

    let chat_id = match &classified {
        Classified::ButtonCallback { chat_id, .. }
        | Classified::FreeForm { chat_id, .. }
        | Classified::ReplyTo { chat_id, .. } => chat_id.clone(),
        Classified::Unrecognized => return Ok(()),
    };

    let user_id = sender_user_id(&update);
    let chat_ok = state.config.chat_allowed(&chat_id);
    let user_ok = user_id.map(|u| state.config.user_allowed(&u)).unwrap_or(false);
    if !chat_ok || !user_ok {
        return Ok(());
    }

    let (session_id, text) = match classified {
        Classified::ButtonCallback { token, chat_id } => {
            match resolve_token(state, &token, &chat_id).await? {
                Some(session_id) => (session_id, String::new()),
                None => return Ok(()),
            }
        }
        Classified::FreeForm { token, text, chat_id } => {
            match resolve_token(state, &token, &chat_id).await? {
                Some(session_id) => (session_id, text),
                None => return Ok(()),
            }
        }
        Classified::ReplyTo { message_id, text, chat_id } => {
            let resolved = db_blocking(state, move |s| s.messages.resolve_scoped(&message_id, &chat_id)).await?;
            match resolved {
                Some(session_id) => (session_id, text),
                None => return Ok(()),
            }
        }
        Classified::Unrecognized => return Ok(()),
    };

    if text.len() > state.config.max_command_length_bytes {
        let _ = state.chat.send_text(&chat_id, "Command too long.", None).await;
        return Ok(());
    }

    let session_id_for_lookup = session_id.clone();
    let Some(session) = db_blocking(state, move |s| s.sessions.get(&session_id_for_lookup)).await? else {
        return Ok(());
    };

    let machine_id = session.machine_id.clone();
    let depth = db_blocking(state, move |s| s.queue.depth_for_machine(&machine_id)).await?;
    if depth >= state.config.max_queue_per_machine {
        let _ = state.chat.send_text(&chat_id, "Queue is full, try again shortly.", None).await;
        return Ok(());
    }

    let id = {
        let machine_id = session.machine_id.clone();
        let session_id = session_id.clone();
        let text = text.clone();
        let chat_id = chat_id.clone();
        db_blocking(state, move |s| s.queue.enqueue(&machine_id, &session_id, &text, &chat_id)).await?
    };
    if state.connections.is_connected(&session.machine_id).await {
        let frame = RouterFrame::Command {
            command_id: id.to_string(),
            session_id: session_id.clone(),
            command: text,
            chat_id,
        };
        if state.connections.try_send(&session.machine_id, frame).await {
            db_blocking(state, move |s| s.queue.mark_sent(id)).await?;
        }
    }

    Ok(())
}

/// Resolve and validate a token, replying with a generic, non-leaking error
/// on any mismatch. Never reveals whether the token exists in a different chat.
async fn resolve_token(
    state: &Arc<RouterState>,
    token: &str,
    chat_id: &str,
) -> anyhow::Result<Option<String>> {
    let token = token.to_owned();
    let chat_id_owned = chat_id.to_owned();
    let validation = db_blocking(state, move |s| s.tokens.validate(&token, &chat_id_owned)).await?;
    match validation {
        TokenValidation::Valid { session_id } => Ok(Some(session_id)),
        TokenValidation::NotFound | TokenValidation::Expired | TokenValidation::ChatIdMismatch => {
            let _ = state.chat.send_text(chat_id, "This reply link is no longer valid.", None).await;
            Ok(None)
        }
    }
}

fn classify(update: &Update) -> Option<Classified> {
    match &update.kind {
        UpdateKind::CallbackQuery(callback) => {
            let data = callback.data.as_deref()?;
            let chat_id = callback.message.as_ref()?.chat().id.0.to_string();
            let token = if let Some(rest) = data.strip_prefix("cmd:") {
                rest.split(':').next()?.to_owned()
            } else if let Some(rest) = data.strip_prefix("personal:") {
                rest.to_owned()
            } else {
                return None;
            };
            Some(Classified::ButtonCallback { token, chat_id })
        }
        UpdateKind::Message(message) => {
            let text = message.text()?;
            let chat_id = message.chat.id.0.to_string();

            if let Some(reply) = message.reply_to_message() {
                return Some(Classified::ReplyTo {
                    message_id: reply.id.0.to_string(),
                    text: text.to_owned(),
                    chat_id,
                });
            }

            if let Some(rest) = text.strip_prefix("/cmd ") {
                let mut parts = rest.splitn(2, ' ');
                let token = parts.next()?.to_owned();
                let body = parts.next().unwrap_or("").to_owned();
                return Some(Classified::FreeForm { token, text: body, chat_id });
            }

            // Direct `<TOKEN> <text>` shape: an 8-30 char URL-safe token
            // followed by at least one space and a body.
            let mut parts = text.splitn(2, ' ');
            let maybe_token = parts.next().unwrap_or("");
            if is_token_shaped(maybe_token) {
                if let Some(body) = parts.next() {
                    return Some(Classified::FreeForm {
                        token: maybe_token.to_owned(),
                        text: body.to_owned(),
                        chat_id,
                    });
                }
            }

            None
        }
        _ => None,
    }
}

fn is_token_shaped(s: &str) -> bool {
    (8..=30).contains(&s.len())
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn sender_user_id(update: &Update) -> Option<String> {
    match &update.kind {
        UpdateKind::Message(message) => message.from.as_ref().map(|u| u.id.0.to_string()),
        UpdateKind::CallbackQuery(callback) => Some(callback.from.id.0.to_string()),
        _ => None,
    }
}
