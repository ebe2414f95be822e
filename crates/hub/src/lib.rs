// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! relay-hub: the cloud-resident Edge Router singleton.

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod retry_sweep;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::chat::TelegramProvider;
use crate::config::RouterConfig;
use crate::db::Db;
use crate::state::RouterState;
use crate::transport::build_router;

/// Run the Router until shutdown.
pub async fn run(config: RouterConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let db = Arc::new(Db::open(&config.db_path)?);
    let chat = Arc::new(TelegramProvider::new(&config.bot_token));
    let state = Arc::new(RouterState::new(config, db, chat, shutdown.clone()));

    retry_sweep::spawn(Arc::clone(&state));

    tracing::info!(addr = %addr, "relay-hub listening");
    let drain_deadline = state.config.shutdown_drain();
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;

    spawn_signal_handler(shutdown.clone());

    let shutdown_signal = shutdown.clone().cancelled_owned();
    let serve = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal);

    tokio::select! {
        result = serve => result?,
        _ = drain_timeout(shutdown, drain_deadline) => {
            tracing::warn!("drain deadline elapsed, forcing exit");
        }
    }
    Ok(())
}

/// First SIGTERM/SIGINT cancels `shutdown` (stop accepting new connections,
/// let in-flight requests drain); a second one forces an immediate exit.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        wait_for_signal(&mut sigterm, &mut sigint).await;
        tracing::info!("shutdown signal received, draining");
        shutdown.cancel();

        wait_for_signal(&mut sigterm, &mut sigint).await;
        tracing::warn!("second shutdown signal received, forcing exit");
        std::process::exit(130);
    });
}

async fn wait_for_signal(
    sigterm: &mut Option<tokio::signal::unix::Signal>,
    sigint: &mut Option<tokio::signal::unix::Signal>,
) {
    tokio::select! {
        _ = async { match sigterm { Some(s) => s.recv().await, None => std::future::pending().await } } => {}
        _ = async { match sigint { Some(s) => s.recv().await, None => std::future::pending().await } } => {}
    }
}

/// Resolves `drain_deadline` after `shutdown` fires, letting the caller race
/// it against the in-flight drain and force an exit if it overruns.
async fn drain_timeout(shutdown: CancellationToken, drain_deadline: std::time::Duration) {
    shutdown.cancelled().await;
    tokio::time::sleep(drain_deadline).await;
}
