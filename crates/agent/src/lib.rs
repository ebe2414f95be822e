// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! relay-agent: the workstation-resident Machine Agent.

pub mod config;
pub mod db;
pub mod direct;
pub mod error;
pub mod inbox;
pub mod injector;
pub mod process;
pub mod registry;
pub mod router_client;
pub mod state;
pub mod sweep;
pub mod transport;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::state::AgentState;

/// Run the Agent until shutdown.
pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    let listen_addr = config.listen_addr.clone();
    let router_mode = config.router_mode();
    let drain_deadline = config.shutdown_drain();

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let state = AgentState::new(config, router_mode.then_some(outbound_tx))?;

    sweep::spawn(std::sync::Arc::clone(&state));
    if router_mode {
        tokio::spawn(transport::duplex::run(std::sync::Arc::clone(&state), outbound_rx));
    }

    tracing::info!(addr = %listen_addr, router_mode, "relay-agent listening");
    let router = transport::build_router(std::sync::Arc::clone(&state));
    let listener = TcpListener::bind(&listen_addr).await?;

    let shutdown = state.shutdown.clone();
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

/// First SIGTERM/SIGINT cancels `shutdown` (stop accepting new local HTTP
/// connections, let in-flight `Injector::inject` calls drain, close the
/// duplex channel); a second one forces an immediate exit.
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
