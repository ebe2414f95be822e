// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use rusqlite::params;

use crate::db::{now, Db};

/// Webhook dedup table, keyed by the chat platform's `update_id`.
pub struct SeenUpdateStore {
    db: Arc<Db>,
}

impl SeenUpdateStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Record `update_id` as seen. Returns `true` if this is the first time
    /// (caller should process it), `false` if it was already present (drop).
    pub fn record_if_new(&self, update_id: &str) -> rusqlite::Result<bool> {
        let conn = self.db.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO seen_updates (update_id, received_at) VALUES (?1, ?2)",
            params![update_id, now()],
        )?;
        Ok(changed == 1)
    }

    pub fn cleanup_expired(&self, retention_secs: i64) -> rusqlite::Result<usize> {
        let conn = self.db.conn.lock();
        let horizon = now() - retention_secs;
        conn.execute("DELETE FROM seen_updates WHERE received_at < ?1", params![horizon])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_update_id_is_dropped() {
        let store = SeenUpdateStore::new(Arc::new(Db::open_in_memory().unwrap()));
        assert!(store.record_if_new("u1").unwrap());
        assert!(!store.record_if_new("u1").unwrap());
        assert!(!store.record_if_new("u1").unwrap());
    }
}
