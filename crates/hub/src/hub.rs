// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-machine duplex connection hub.
//!
//! Exactly one duplex channel is live per machine at any instant. A newly
//! authenticated upgrade for an already-connected machine closes the old
//! channel with a distinguishing close code before the new one is installed,
//! the same "replace, don't multiplex" rule `mux`'s `SessionEntry.ws_bridge`
//! enforces implicitly by holding a single `Option<Arc<WsBridge>>` per session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use relay_wire::RouterFrame;

/// Close code sent to a connection that is being replaced by a newer one.
pub const CLOSE_REPLACED: u16 = 4000;
/// Close code sent when a connection is closed by policy (e.g. shutdown).
pub const CLOSE_POLICY: u16 = 4001;

/// What the per-connection writer task consumes from the hub.
pub enum Outbound {
    Frame(RouterFrame),
    Close(u16),
}

struct MachineHandle {
    tx: mpsc::UnboundedSender<Outbound>,
    generation: u64,
}

/// Live-connection registry, keyed by `machine_id`.
#[derive(Default)]
pub struct MachineHub {
    connections: RwLock<HashMap<String, MachineHandle>>,
    next_generation: AtomicU64,
}

/// A connection's membership token; used to avoid removing a newer connection
/// when an older reader task notices its own socket dropped after replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

impl MachineHub {
    pub fn new() -> Self {
        Self { connections: RwLock::new(HashMap::new()), next_generation: AtomicU64::new(1) }
    }

    /// Install a new connection for `machine_id`, replacing and closing any
    /// existing one. Returns the new connection's generation token and the
    /// receiver the writer task should drain.
    pub async fn install(
        &self,
        machine_id: &str,
    ) -> (Generation, mpsc::UnboundedReceiver<Outbound>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut guard = self.connections.write().await;
        if let Some(old) = guard.remove(machine_id) {
            let _ = old.tx.send(Outbound::Close(CLOSE_REPLACED));
        }
        guard.insert(machine_id.to_owned(), MachineHandle { tx, generation });

        (Generation(generation), rx)
    }

    /// Remove a connection, but only if it is still the current one for that
    /// machine (a reader task noticing its socket died after being replaced
    /// must not evict the connection that replaced it).
    pub async fn remove_if_current(&self, machine_id: &str, generation: Generation) {
        let mut guard = self.connections.write().await;
        if let Some(handle) = guard.get(machine_id) {
            if handle.generation == generation.0 {
                guard.remove(machine_id);
            }
        }
    }

    pub async fn is_connected(&self, machine_id: &str) -> bool {
        self.connections.read().await.contains_key(machine_id)
    }

    /// Send a command frame to a connected machine. Returns `false` if the
    /// machine is offline or the send failed (receiver task gone).
    pub async fn try_send(&self, machine_id: &str, frame: RouterFrame) -> bool {
        let guard = self.connections.read().await;
        match guard.get(machine_id) {
            Some(handle) => handle.tx.send(Outbound::Frame(frame)).is_ok(),
            None => false,
        }
    }

    pub async fn connected_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reconnect_closes_old_with_replaced_code() {
        let hub = MachineHub::new();
        let (_gen1, mut rx1) = hub.install("m1").await;
        let (_gen2, _rx2) = hub.install("m1").await;

        match rx1.recv().await {
            Some(Outbound::Close(code)) => assert_eq!(code, CLOSE_REPLACED),
            other => panic!("expected close frame, got {other:?}", other = other.is_some()),
        }
    }

    #[tokio::test]
    async fn stale_reader_cannot_evict_newer_connection() {
        let hub = MachineHub::new();
        let (gen1, _rx1) = hub.install("m1").await;
        let (_gen2, _rx2) = hub.install("m1").await;

        hub.remove_if_current("m1", gen1).await;
        assert!(hub.is_connected("m1").await);
    }

    #[tokio::test]
    async fn send_to_offline_machine_returns_false() {
        let hub = MachineHub::new();
        let sent = hub
            .try_send(
                "ghost",
                RouterFrame::Command {
                    command_id: "1".into(),
                    session_id: "s".into(),
                    command: "x".into(),
                    chat_id: "c".into(),
                },
            )
            .await;
        assert!(!sent);
    }
}
