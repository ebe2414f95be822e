// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use relay_wire::http::{
    HealthResponse, RegisterSessionRequest, RouterSessionView, SendNotificationRequest,
    SendNotificationResponse, UnregisterSessionRequest,
};
use relay_wire::RouterFrame;

use crate::error::RouterError;
use crate::state::{db_blocking, RouterState};

pub async fn health(State(state): State<Arc<RouterState>>) -> Json<HealthResponse> {
    let sessions = db_blocking(&state, |s| s.sessions.count()).await.unwrap_or(0);
    Json(HealthResponse { ok: true, sessions })
}

pub async fn register_session(
    State(state): State<Arc<RouterState>>,
    Json(req): Json<RegisterSessionRequest>,
) -> Result<Json<RouterSessionView>, RouterError> {
    let session = db_blocking(&state, move |s| -> Result<_, RouterError> {
        let existing = s.sessions.get(&req.session_id)?;
        if existing.is_none() && s.sessions.count()? >= s.config.max_total_sessions {
            return Err(RouterError::SessionLimitReached);
        }
        Ok(s.sessions.upsert(&req.session_id, &req.machine_id, req.label.as_deref())?)
    })
    .await?;
    Ok(Json(to_view(session)))
}

pub async fn unregister_session(
    State(state): State<Arc<RouterState>>,
    Json(req): Json<UnregisterSessionRequest>,
) -> Result<Json<serde_json::Value>, RouterError> {
    db_blocking(&state, move |s| s.sessions.remove(&req.session_id)).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn list_sessions(
    State(state): State<Arc<RouterState>>,
) -> Result<Json<Vec<RouterSessionView>>, RouterError> {
    let sessions = db_blocking(&state, |s| s.sessions.list()).await?;
    Ok(Json(sessions.into_iter().map(to_view).collect()))
}

pub async fn send_notification(
    State(state): State<Arc<RouterState>>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<Json<SendNotificationResponse>, RouterError> {
    let session_id = req.session_id.clone();
    let known = db_blocking(&state, move |s| -> rusqlite::Result<bool> {
        let known = s.sessions.get(&session_id)?.is_some();
        if known {
            s.sessions.touch(&session_id)?;
        }
        Ok(known)
    })
    .await?;
    if !known {
        return Err(RouterError::SessionNotFound);
    }

    let message_id = state
        .chat
        .send_text(&req.chat_id, &req.text, req.reply_markup.as_ref())
        .await
        .map_err(|e| RouterError::ChatPlatform(e.to_string()))?;

    let message_id_for_record = message_id.clone();
    db_blocking(&state, move |s| -> rusqlite::Result<()> {
        s.messages.record(&message_id_for_record, &req.session_id, &req.chat_id)?;

        if let Some(token) = req.reply_token.as_deref() {
            let ttl = req.reply_token_ttl_secs.unwrap_or(86_400);
            s.tokens.bind(token, &req.session_id, &req.chat_id, ttl)?;
        }
        if let Some(markup) = req.reply_markup.as_ref() {
            let ttl = req.reply_token_ttl_secs.unwrap_or(86_400);
            for button in &markup.buttons {
                s.tokens.bind(&button.token, &req.session_id, &req.chat_id, ttl)?;
            }
        }
        Ok(())
    })
    .await?;

    Ok(Json(SendNotificationResponse { message_id }))
}

pub async fn cleanup(State(state): State<Arc<RouterState>>) -> Result<Json<serde_json::Value>, RouterError> {
    let (sessions_removed, updates_removed, tokens_removed) = db_blocking(&state, |s| -> rusqlite::Result<_> {
        let sessions_removed = s.sessions.cleanup_stale(s.config.session_ttl_secs)?;
        let updates_removed = s.seen.cleanup_expired(s.config.seen_update_retention_secs)?;
        let tokens_removed = s.tokens.cleanup_expired()?;
        Ok((sessions_removed, updates_removed, tokens_removed))
    })
    .await?;
    Ok(Json(serde_json::json!({
        "sessions_removed": sessions_removed,
        "updates_removed": updates_removed,
        "tokens_removed": tokens_removed,
    })))
}

fn to_view(session: crate::store::RouterSession) -> RouterSessionView {
    RouterSessionView {
        session_id: session.session_id,
        machine_id: session.machine_id,
        label: session.label,
        created_at: session.created_at,
        updated_at: session.updated_at,
    }
}

/// Flush everything still `queued` for a machine in FIFO order, over its live
/// duplex connection. A transmit failure stops the flush, leaving the rest
/// queued for the next connect.
pub async fn flush_queue(state: &Arc<RouterState>, machine_id: &str) -> rusqlite::Result<()> {
    let machine_id_owned = machine_id.to_owned();
    let entries = db_blocking(state, move |s| s.queue.queued_for_machine(&machine_id_owned)).await?;
    for entry in entries {
        let frame = RouterFrame::Command {
            command_id: entry.id.to_string(),
            session_id: entry.session_id.clone(),
            command: entry.command_text.clone(),
            chat_id: entry.chat_id.clone(),
        };
        if !state.connections.try_send(machine_id, frame).await {
            break;
        }
        db_blocking(state, move |s| s.queue.mark_sent(entry.id)).await?;
    }
    Ok(())
}
