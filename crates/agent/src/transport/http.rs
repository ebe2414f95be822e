// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local HTTP surface the Agent exposes to shell hooks, editor plugins, and
//! whatever else runs session-start/stop notifications on this workstation.
//! Shaped after `relay-hub::transport::http`'s handler style, but unauthenticated
//! since it only ever binds to loopback.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use relay_wire::http::{
    EnableNotifyRequest, HealthResponse, SessionStartRequest, SessionView, StopRequest, StopResponse,
    TokenValidateRequest, TokenValidateResponse, SendNotificationRequest, ReplyMarkup,
};

use crate::error::AgentError;
use crate::registry::token::TokenValidation;
use crate::registry::{Session, TransportDescriptor, UpsertFields};
use crate::state::{db_blocking, AgentState};

pub async fn health(State(state): State<Arc<AgentState>>) -> Json<HealthResponse> {
    let sessions = db_blocking(&state, |s| s.registry.list(true, false).map(|v| v.len()))
        .await
        .unwrap_or(0);
    Json(HealthResponse { ok: true, sessions })
}

pub async fn session_start(
    State(state): State<Arc<AgentState>>,
    Json(req): Json<SessionStartRequest>,
) -> Result<Json<SessionView>, AgentError> {
    let (transport, fallback_transport) = match req.transport {
        Some(dto) => split_fallback(dto),
        None => (None, None),
    };
    let fields = UpsertFields {
        parent_pid: req.ppid,
        pid: req.pid,
        start_time: req.start_time,
        cwd: req.cwd,
        label: req.label,
        notify: req.notify,
        transport,
        fallback_transport,
    };
    let session_ttl_secs = state.config.session_ttl_secs;
    let session_id = req.session_id.clone();
    let session =
        db_blocking(&state, move |s| s.registry.upsert(&session_id, fields, session_ttl_secs)).await?;
    Ok(Json(to_view(session)))
}

pub async fn stop(
    State(state): State<Arc<AgentState>>,
    Json(req): Json<StopRequest>,
) -> Result<Json<StopResponse>, AgentError> {
    let session_id = req.session_id.clone();
    let session = db_blocking(&state, move |s| -> Result<_, AgentError> {
        let session = s.registry.get(&session_id)?.ok_or(AgentError::SessionNotFound)?;
        s.registry.stop(&session_id)?;
        Ok(session)
    })
    .await?;

    if !session.notify {
        return Ok(Json(StopResponse { ok: true, notified: false }));
    }
    let Some(chat_id) = state.config.default_chat_id.clone() else {
        return Ok(Json(StopResponse { ok: true, notified: false }));
    };

    let text = req
        .message
        .or(req.summary)
        .unwrap_or_else(|| format!("{} stopped ({})", session.label.as_deref().unwrap_or(&session.session_id), req.event));
    let session_id = req.session_id.clone();
    let chat_id_for_mint = chat_id.clone();
    let event = req.event.clone();
    let reply_token_ttl_secs = state.config.reply_token_ttl_secs;
    let token = db_blocking(&state, move |s| {
        s.tokens.mint(&session_id, &chat_id_for_mint, Some(&event), reply_token_ttl_secs)
    })
    .await?;

    let notified = notify(&state, &req.session_id, &chat_id, &text, &token).await;
    Ok(Json(StopResponse { ok: true, notified }))
}

pub async fn enable_notify(
    State(state): State<Arc<AgentState>>,
    Json(req): Json<EnableNotifyRequest>,
) -> Result<Json<SessionView>, AgentError> {
    let transport = req.transport.and_then(|dto| split_fallback(dto).0);
    let session_id = req.session_id.clone();
    let label = req.label.clone();
    let session = db_blocking(&state, move |s| s.registry.enable_notify(&session_id, &label, transport))
        .await?
        .ok_or(AgentError::SessionNotFound)?;
    Ok(Json(to_view(session)))
}

pub async fn list_sessions(State(state): State<Arc<AgentState>>) -> Result<Json<Vec<SessionView>>, AgentError> {
    let sessions = db_blocking(&state, |s| s.registry.list(false, false)).await?;
    Ok(Json(sessions.into_iter().map(to_view).collect()))
}

pub async fn get_session(
    State(state): State<Arc<AgentState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, AgentError> {
    let session = db_blocking(&state, move |s| s.registry.get(&session_id))
        .await?
        .ok_or(AgentError::SessionNotFound)?;
    Ok(Json(to_view(session)))
}

pub async fn delete_session(
    State(state): State<Arc<AgentState>>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, AgentError> {
    db_blocking(&state, move |s| s.registry.delete(&session_id)).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn heartbeat(
    State(state): State<Arc<AgentState>>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, AgentError> {
    let session_ttl_secs = state.config.session_ttl_secs;
    db_blocking(&state, move |s| -> Result<(), AgentError> {
        if s.registry.get(&session_id)?.is_none() {
            return Err(AgentError::SessionNotFound);
        }
        s.registry.touch(&session_id, session_ttl_secs)?;
        Ok(())
    })
    .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn validate_token(
    State(state): State<Arc<AgentState>>,
    Json(req): Json<TokenValidateRequest>,
) -> Result<Json<TokenValidateResponse>, AgentError> {
    let result = db_blocking(&state, move |s| s.tokens.validate(&req.token, &req.chat_id)).await?;
    Ok(Json(match result {
        TokenValidation::Valid { session_id, context } => {
            TokenValidateResponse { valid: true, session_id: Some(session_id), context }
        }
        _ => TokenValidateResponse { valid: false, session_id: None, context: None },
    }))
}

pub async fn cleanup(State(state): State<Arc<AgentState>>) -> Result<Json<serde_json::Value>, AgentError> {
    let inbox_retention_secs = state.config.inbox_retention_secs;
    let (sessions_removed, tokens_removed, inbox_pruned) = db_blocking(&state, move |s| -> Result<_, AgentError> {
        let sessions_removed = s.registry.cleanup_expired()?;
        let tokens_removed = s.tokens.cleanup_expired()?;
        let inbox_pruned = s.inbox.prune_done(inbox_retention_secs)?;
        Ok((sessions_removed, tokens_removed, inbox_pruned))
    })
    .await?;
    Ok(Json(serde_json::json!({
        "sessions_removed": sessions_removed,
        "tokens_removed": tokens_removed,
        "inbox_pruned": inbox_pruned,
    })))
}

async fn notify(state: &Arc<AgentState>, session_id: &str, chat_id: &str, text: &str, token: &str) -> bool {
    if let Some(router) = &state.router {
        let request = SendNotificationRequest {
            session_id: session_id.to_owned(),
            chat_id: chat_id.to_owned(),
            text: text.to_owned(),
            reply_token: Some(token.to_owned()),
            reply_token_ttl_secs: Some(state.config.reply_token_ttl_secs),
            reply_markup: None::<ReplyMarkup>,
        };
        return router.send_notification(&request).await.is_ok();
    }
    if let Some(direct) = &state.direct {
        return direct.send_text(chat_id, text, None).await.is_ok();
    }
    false
}

fn split_fallback(
    dto: relay_wire::http::TransportDescriptorDto,
) -> (Option<TransportDescriptor>, Option<TransportDescriptor>) {
    use relay_wire::http::TransportDescriptorDto as Dto;
    if let Dto::TerminalEditorRpc { fallback_pane_identifier: Some(pane), .. } = &dto {
        let fallback = TransportDescriptor::TerminalMultiplexer { pane_identifier: pane.clone(), session_name: None };
        return (Some(dto.into()), Some(fallback));
    }
    (Some(dto.into()), None)
}

fn to_view(session: Session) -> SessionView {
    SessionView {
        session_id: session.session_id,
        label: session.label,
        notify: session.notify,
        state: match session.state {
            crate::registry::SessionState::Running => "running".to_owned(),
            crate::registry::SessionState::Stopped => "stopped".to_owned(),
        },
        cwd: session.cwd,
        created_at: session.created_at,
        updated_at: session.updated_at,
        last_seen: session.last_seen,
        expires_at: session.expires_at,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::config::AgentConfig;
    use crate::transport::build_router;

    fn test_config() -> AgentConfig {
        AgentConfig {
            edge_router_url: None,
            machine_id: "m1".into(),
            shared_api_key: String::new(),
            bot_token: None,
            default_chat_id: None,
            listen_addr: "127.0.0.1:0".into(),
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 30_000,
            ping_interval_secs: 30,
            pong_timeout_secs: 90,
            session_ttl_secs: 86_400,
            reply_token_ttl_secs: 86_400,
            inbox_retention_secs: 3_600,
            sweep_interval_secs: 300,
            inject_timeout_secs: 10,
            start_time_tolerance_secs: 2,
            db_path: ":memory:".into(),
            shutdown_drain_secs: 10,
        }
    }

    fn test_state() -> Arc<AgentState> {
        let db = Arc::new(crate::db::Db::open_in_memory().unwrap());
        Arc::new(AgentState {
            registry: crate::registry::SessionRegistry::new(Arc::clone(&db)),
            tokens: crate::registry::token::TokenStore::new(Arc::clone(&db)),
            inbox: crate::inbox::InboxStore::new(Arc::clone(&db)),
            injector: crate::injector::Injector::new(std::time::Duration::from_secs(1)),
            router: None,
            direct: None,
            outbound: None,
            db,
            shutdown: tokio_util::sync::CancellationToken::new(),
            config: test_config(),
        })
    }

    #[tokio::test]
    async fn session_start_then_get_round_trips() {
        let server = axum_test::TestServer::new(build_router(test_state())).unwrap();
        let resp = server.post("/session-start").json(&serde_json::json!({ "session_id": "s1", "pid": 42 })).await;
        resp.assert_status_ok();

        let resp = server.get("/sessions/s1").await;
        resp.assert_status_ok();
        let view: SessionView = resp.json();
        assert_eq!(view.session_id, "s1");
        assert_eq!(view.state, "running");
    }

    #[tokio::test]
    async fn get_unknown_session_is_404() {
        let server = axum_test::TestServer::new(build_router(test_state())).unwrap();
        let resp = server.get("/sessions/ghost").await;
        resp.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn enable_notify_on_unknown_session_is_404() {
        let server = axum_test::TestServer::new(build_router(test_state())).unwrap();
        let resp = server
            .post("/sessions/enable-notify")
            .json(&serde_json::json!({ "session_id": "ghost", "label": "l" }))
            .await;
        resp.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stop_without_notify_reports_not_notified() {
        let server = axum_test::TestServer::new(build_router(test_state())).unwrap();
        server.post("/session-start").json(&serde_json::json!({ "session_id": "s1" })).await;

        let resp = server.post("/stop").json(&serde_json::json!({ "session_id": "s1", "event": "done" })).await;
        resp.assert_status_ok();
        let body: StopResponse = resp.json();
        assert!(body.ok);
        assert!(!body.notified);
    }

    #[tokio::test]
    async fn validate_unknown_token_returns_invalid() {
        let server = axum_test::TestServer::new(build_router(test_state())).unwrap();
        let resp = server.post("/tokens/validate").json(&serde_json::json!({ "token": "nope", "chat_id": "c1" })).await;
        resp.assert_status_ok();
        let body: TokenValidateResponse = resp.json();
        assert!(!body.valid);
    }
}
