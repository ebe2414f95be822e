// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent's half of the duplex channel: a reconnecting WebSocket client.
//! Grounded on `mux::upstream::bridge::run_loop`'s exponential-backoff
//! reconnect shape, adapted from that file's generic correlation-routed
//! message bus down to this contract's much smaller frame set.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use relay_wire::{AgentFrame, RouterFrame};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::db::now;
use crate::state::{db_blocking, AgentState};

/// Runs until `state.shutdown` is cancelled, reconnecting with doubling
/// backoff on every drop. `outbound_rx` carries frames the rest of the
/// process (HTTP handlers, the sweep task) wants sent upstream.
pub async fn run(state: Arc<AgentState>, mut outbound_rx: mpsc::UnboundedReceiver<AgentFrame>) {
    let Some(url) = state.config.duplex_url() else {
        tracing::info!("no edge router configured, duplex client disabled");
        return;
    };

    let mut backoff = state.config.reconnect_initial();
    let last_pong = Arc::new(AtomicI64::new(now()));

    loop {
        if state.shutdown.is_cancelled() {
            return;
        }

        match connect(&url, &state.config.shared_api_key).await {
            Ok(stream) => {
                backoff = state.config.reconnect_initial();
                tracing::info!("connected to edge router duplex");
                replay_pending(&state).await;
                last_pong.store(now(), Ordering::Relaxed);
                run_connection(&state, stream, &mut outbound_rx, Arc::clone(&last_pong)).await;
            }
            Err(e) => {
                tracing::debug!(err = %e, backoff = ?backoff, "duplex connect failed, retrying");
            }
        }

        if state.shutdown.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = state.shutdown.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(state.config.reconnect_max());
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(url: &str, api_key: &str) -> Result<WsStream, tokio_tungstenite::tungstenite::Error> {
    let mut request = url.into_client_request()?;
    let header_value = format!("Bearer {api_key}")
        .parse()
        .unwrap_or_else(|_| tokio_tungstenite::tungstenite::http::HeaderValue::from_static("Bearer invalid"));
    request.headers_mut().insert("authorization", header_value);
    let (stream, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

async fn replay_pending(state: &Arc<AgentState>) {
    let Ok(pending) = db_blocking(state, |s| s.inbox.pending()).await else { return };
    for entry in pending {
        tracing::info!(command_id = %entry.command_id, "replaying unfinished command on reconnect");
        spawn_dispatch(Arc::clone(state), entry.command_id, entry.payload_json);
    }
}

async fn run_connection(
    state: &Arc<AgentState>,
    stream: WsStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<AgentFrame>,
    last_pong: Arc<AtomicI64>,
) {
    let (mut write, mut read) = stream.split();
    let mut ping_interval = tokio::time::interval(state.config.ping_interval());
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }

            _ = ping_interval.tick() => {
                let pong_timeout = state.config.pong_timeout().as_secs() as i64;
                if now() - last_pong.load(Ordering::Relaxed) > pong_timeout {
                    tracing::warn!("no pong within timeout, reconnecting");
                    return;
                }
                if send_frame(&mut write, &AgentFrame::Ping).await.is_err() {
                    return;
                }
            }

            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if send_frame(&mut write, &frame).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }

            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_router_frame(state, &text, &last_pong).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!("duplex connection closed by edge router");
                        return;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(err = %e, "duplex read error");
                        return;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn send_frame(
    write: &mut futures_util::stream::SplitSink<WsStream, Message>,
    frame: &AgentFrame,
) -> Result<(), ()> {
    let Ok(text) = serde_json::to_string(frame) else { return Ok(()) };
    write.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn handle_router_frame(state: &Arc<AgentState>, text: &str, last_pong: &Arc<AtomicI64>) {
    let frame: RouterFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            tracing::debug!("unrecognized duplex frame, ignoring");
            return;
        }
    };
    match frame {
        RouterFrame::Pong => {
            last_pong.store(now(), Ordering::Relaxed);
        }
        RouterFrame::Command { command_id, session_id, command, chat_id } => {
            handle_command(state, command_id, session_id, command, chat_id).await;
        }
    }
}

async fn handle_command(state: &Arc<AgentState>, command_id: String, session_id: String, command: String, chat_id: String) {
    let payload = serde_json::json!({ "session_id": session_id, "command": command, "chat_id": chat_id }).to_string();
    let payload_for_insert = payload.clone();
    let command_id_for_insert = command_id.clone();
    let outcome =
        match db_blocking(state, move |s| s.inbox.insert_if_absent(&command_id_for_insert, &payload_for_insert)).await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(command_id = %command_id, err = %e, "failed to record inbound command");
                return;
            }
        };
    // Ack unconditionally: the Router's own ack-handling is idempotent, and a
    // duplicate here means our earlier ack was itself lost.
    state.send_upstream(AgentFrame::Ack { command_id: command_id.clone() });
    if outcome == crate::inbox::InsertOutcome::AlreadyPresent {
        return;
    }
    spawn_dispatch(Arc::clone(state), command_id, payload);
}

fn spawn_dispatch(state: Arc<AgentState>, command_id: String, payload_json: String) {
    tokio::spawn(async move {
        let parsed: serde_json::Value = match serde_json::from_str(&payload_json) {
            Ok(value) => value,
            Err(_) => return,
        };
        let session_id = parsed.get("session_id").and_then(|v| v.as_str()).unwrap_or_default();
        let command = parsed.get("command").and_then(|v| v.as_str()).unwrap_or_default();
        let chat_id = parsed.get("chat_id").and_then(|v| v.as_str()).map(str::to_owned);

        let session_id_owned = session_id.to_owned();
        let session = match db_blocking(&state, move |s| s.registry.get(&session_id_owned)).await {
            Ok(Some(session)) => session,
            _ => {
                tracing::warn!(command_id = %command_id, session_id, "command targets unknown session");
                state.send_upstream(AgentFrame::CommandResult {
                    command_id,
                    success: false,
                    error: Some("unknown session".into()),
                    chat_id,
                });
                return;
            }
        };

        let result = state.injector.inject(&session.transport, session.fallback_transport.as_ref(), command).await;
        match result {
            Ok(()) => {
                let command_id_for_mark = command_id.clone();
                let _ = db_blocking(&state, move |s| s.inbox.mark_done(&command_id_for_mark)).await;
                state.send_upstream(AgentFrame::CommandResult { command_id, success: true, error: None, chat_id });
            }
            Err(e) => {
                tracing::warn!(command_id = %command_id, err = %e, "command injection failed");
                state.send_upstream(AgentFrame::CommandResult {
                    command_id,
                    success: false,
                    error: Some(e.to_string()),
                    chat_id,
                });
            }
        }
    });
}
