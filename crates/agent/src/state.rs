// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared process state for the Machine Agent, wired together the way
//! `relay-hub::state::RouterState` wires the Router's.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::db::Db;
use crate::direct::DirectNotifier;
use crate::inbox::InboxStore;
use crate::injector::Injector;
use crate::registry::token::TokenStore;
use crate::registry::SessionRegistry;
use crate::router_client::RouterClient;
use relay_wire::AgentFrame;

pub struct AgentState {
    pub config: AgentConfig,
    pub db: Arc<Db>,
    pub registry: SessionRegistry,
    pub tokens: TokenStore,
    pub inbox: InboxStore,
    pub injector: Injector,
    pub router: Option<RouterClient>,
    pub direct: Option<DirectNotifier>,
    /// Frames queued for the duplex client to send upstream; `None` in
    /// direct mode, where there is no Router connection to carry them.
    pub outbound: Option<mpsc::UnboundedSender<AgentFrame>>,
    pub shutdown: CancellationToken,
}

impl AgentState {
    pub fn new(config: AgentConfig, outbound: Option<mpsc::UnboundedSender<AgentFrame>>) -> rusqlite::Result<Arc<Self>> {
        let db = Arc::new(Db::open(&config.db_path)?);
        let router = config
            .edge_router_url
            .clone()
            .map(|url| RouterClient::new(url, config.shared_api_key.clone()));
        let direct = DirectNotifier::new(config.bot_token.clone());
        let injector = Injector::new(config.inject_timeout());

        Ok(Arc::new(Self {
            registry: SessionRegistry::new(Arc::clone(&db)),
            tokens: TokenStore::new(Arc::clone(&db)),
            inbox: InboxStore::new(Arc::clone(&db)),
            injector,
            router,
            direct,
            outbound,
            db,
            shutdown: CancellationToken::new(),
            config,
        }))
    }

    pub fn send_upstream(&self, frame: AgentFrame) {
        if let Some(tx) = &self.outbound {
            let _ = tx.send(frame);
        }
    }
}

/// Runs a synchronous store closure on the blocking thread pool, mirroring
/// `relay_hub::state::db_blocking` — SQLite calls from async handlers must
/// not run on the async executor.
pub async fn db_blocking<T, F>(state: &Arc<AgentState>, f: F) -> T
where
    F: FnOnce(&AgentState) -> T + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state)).await.expect("blocking db task panicked")
}
