// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable command inbox: the exactly-once state machine at the heart of the
//! Agent. Grounded on the `INSERT OR IGNORE`-then-check-rowcount idiom used
//! throughout the pack's rusqlite stores (`relay-hub`'s `SeenUpdateStore`),
//! keyed here by `command_id` instead of `update_id`.

use std::sync::Arc;

use rusqlite::params;

use crate::db::{now, Db};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxStatus {
    Received,
    Done,
}

impl InboxStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Done => "done",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "done" => Self::Done,
            _ => Self::Received,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InboxEntry {
    pub command_id: String,
    pub received_at: i64,
    pub payload_json: String,
    pub status: InboxStatus,
    pub updated_at: i64,
}

/// Outcome of an insert attempt, used to decide whether to dispatch to the Injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

pub struct InboxStore {
    db: Arc<Db>,
}

impl InboxStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// `INSERT-IF-ABSENT` on `command_id`: the primary key makes this
    /// idempotent across retries and process restarts.
    pub fn insert_if_absent(&self, command_id: &str, payload_json: &str) -> rusqlite::Result<InsertOutcome> {
        let conn = self.db.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO inbox (command_id, received_at, payload_json, status, updated_at)
             VALUES (?1, ?2, ?3, 'received', ?2)",
            params![command_id, now(), payload_json],
        )?;
        Ok(if changed == 1 { InsertOutcome::Inserted } else { InsertOutcome::AlreadyPresent })
    }

    pub fn mark_done(&self, command_id: &str) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "UPDATE inbox SET status = 'done', updated_at = ?1 WHERE command_id = ?2",
            params![now(), command_id],
        )?;
        Ok(())
    }

    /// Entries not yet `done`, in insertion order — the replay-on-startup set.
    pub fn pending(&self) -> rusqlite::Result<Vec<InboxEntry>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT command_id, received_at, payload_json, status, updated_at
             FROM inbox WHERE status != 'done' ORDER BY received_at ASC, command_id ASC",
        )?;
        let rows = stmt.query_map([], row_to_entry)?;
        rows.collect()
    }

    pub fn get(&self, command_id: &str) -> rusqlite::Result<Option<InboxEntry>> {
        let conn = self.db.conn.lock();
        conn.query_row(
            "SELECT command_id, received_at, payload_json, status, updated_at
             FROM inbox WHERE command_id = ?1",
            params![command_id],
            row_to_entry,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e),
        })
    }

    /// Scheduled GC: drop `done` entries older than the retention window.
    pub fn prune_done(&self, retention_secs: i64) -> rusqlite::Result<usize> {
        let conn = self.db.conn.lock();
        let horizon = now() - retention_secs;
        conn.execute("DELETE FROM inbox WHERE status = 'done' AND updated_at < ?1", params![horizon])
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<InboxEntry> {
    Ok(InboxEntry {
        command_id: row.get(0)?,
        received_at: row.get(1)?,
        payload_json: row.get(2)?,
        status: InboxStatus::from_str(&row.get::<_, String>(3)?),
        updated_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_command_id_is_reported_not_reinserted() {
        let store = InboxStore::new(Arc::new(Db::open_in_memory().unwrap()));
        assert_eq!(store.insert_if_absent("c1", "{}").unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert_if_absent("c1", "{}").unwrap(), InsertOutcome::AlreadyPresent);
        assert_eq!(store.pending().unwrap().len(), 1);
    }

    #[test]
    fn done_entries_are_excluded_from_pending() {
        let store = InboxStore::new(Arc::new(Db::open_in_memory().unwrap()));
        store.insert_if_absent("c1", "{}").unwrap();
        store.mark_done("c1").unwrap();
        assert!(store.pending().unwrap().is_empty());
    }

    #[test]
    fn prune_only_removes_old_done_entries() {
        let store = InboxStore::new(Arc::new(Db::open_in_memory().unwrap()));
        store.insert_if_absent("c1", "{}").unwrap();
        store.mark_done("c1").unwrap();
        assert_eq!(store.prune_done(3600).unwrap(), 0);
        assert_eq!(store.prune_done(-1).unwrap(), 1);
    }
}
