// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::chat::ChatProvider;
use crate::config::RouterConfig;
use crate::db::Db;
use crate::hub::MachineHub;
use crate::store::{MessageStore, QueueStore, SeenUpdateStore, SessionStore, TokenStore};

/// Shared Router state: the durable tables, the in-memory connection hub, and
/// the outbound chat client. Every HTTP request and duplex message is handled
/// as a concurrent unit against this shared singleton.
pub struct RouterState {
    pub config: RouterConfig,
    pub sessions: SessionStore,
    pub messages: MessageStore,
    pub queue: QueueStore,
    pub seen: SeenUpdateStore,
    pub tokens: TokenStore,
    pub connections: MachineHub,
    pub chat: Arc<dyn ChatProvider>,
    pub shutdown: CancellationToken,
}

impl RouterState {
    pub fn new(
        config: RouterConfig,
        db: Arc<Db>,
        chat: Arc<dyn ChatProvider>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions: SessionStore::new(Arc::clone(&db)),
            messages: MessageStore::new(Arc::clone(&db)),
            queue: QueueStore::new(Arc::clone(&db)),
            seen: SeenUpdateStore::new(Arc::clone(&db)),
            tokens: TokenStore::new(db),
            connections: MachineHub::new(),
            chat,
            shutdown,
            config,
        }
    }
}

/// Runs a synchronous store closure on the blocking thread pool, per
/// `spec.md §3`'s rule that SQLite calls from async handlers must not run on
/// the async executor. `f` receives the state by `Arc` clone rather than by
/// reference since `spawn_blocking`'s closure must be `'static`.
pub async fn db_blocking<T, F>(state: &Arc<RouterState>, f: F) -> T
where
    F: FnOnce(&RouterState) -> T + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state)).await.expect("blocking db task panicked")
}
