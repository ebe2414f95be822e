// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Router's half of the per-machine duplex channel: an axum WebSocket
//! upgrade that installs a connection into the `MachineHub`, flushes the
//! queue, and relays `ack`/`commandResult` frames back into durable storage.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use relay_wire::AgentFrame;
use serde::Deserialize;

use crate::hub::Outbound;
use crate::state::{db_blocking, RouterState};
use crate::transport::http::flush_queue;

#[derive(Debug, Deserialize)]
pub struct DuplexQuery {
    pub machine_id: String,
}

pub async fn duplex_handler(
    State(state): State<Arc<RouterState>>,
    Query(query): Query<DuplexQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, query.machine_id, socket))
}

async fn handle_connection(state: Arc<RouterState>, machine_id: String, socket: WebSocket) {
    let (generation, mut outbound_rx) = state.connections.install(&machine_id).await;
    tracing::info!(machine_id = %machine_id, "machine connected");

    if let Err(e) = flush_queue(&state, &machine_id).await {
        tracing::warn!(machine_id = %machine_id, err = %e, "initial queue flush failed");
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Frame(frame)) => {
                        let Ok(text) = serde_json::to_string(&frame) else { continue };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close(code)) => {
                        let _ = ws_tx
                            .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                                code,
                                reason: "replaced".into(),
                            })))
                            .await;
                        break;
                    }
                    None => break,
                }
            }

            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_agent_frame(&state, &machine_id, &text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Binary frames are accepted but treated as zero-value payload.
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(machine_id = %machine_id, err = %e, "duplex read error");
                        break;
                    }
                }
            }
        }
    }

    state.connections.remove_if_current(&machine_id, generation).await;
    tracing::info!(machine_id = %machine_id, "machine disconnected");
}

async fn handle_agent_frame(state: &Arc<RouterState>, machine_id: &str, text: &str) {
    let frame: AgentFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            tracing::debug!(machine_id = %machine_id, "unrecognized duplex frame, ignoring");
            return;
        }
    };

    match frame {
        AgentFrame::Auth { .. } => {
            // Auth happens pre-accept via the upgrade middleware; a post-accept
            // auth frame is accepted for compatibility but is a no-op.
        }
        AgentFrame::Ping => {
            let _ = state.connections.try_send(machine_id, relay_wire::RouterFrame::Pong).await;
        }
        AgentFrame::Ack { command_id } => {
            let machine_id_owned = machine_id.to_owned();
            let result = db_blocking(state, move |s| s.queue.ack_by_id(&machine_id_owned, &command_id)).await;
            if let Err(e) = result {
                tracing::warn!(machine_id = %machine_id, err = %e, "failed to process ack");
            }
        }
        AgentFrame::CommandResult { command_id, success, error, .. } => {
            tracing::info!(
                machine_id = %machine_id,
                command_id = %command_id,
                success,
                error = error.as_deref().unwrap_or(""),
                "command result reported"
            );
        }
    }
}
