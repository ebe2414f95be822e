// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use rusqlite::params;

use crate::db::{now, Db};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Queued,
    Sent,
}

impl QueueStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            _ => Self::Queued,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandQueueEntry {
    pub id: i64,
    pub machine_id: String,
    pub session_id: String,
    pub command_text: String,
    pub chat_id: String,
    pub created_at: i64,
    pub status: QueueStatus,
    pub sent_at: Option<i64>,
}

/// Durable per-machine FIFO command queue, backed by the `command_queue` table.
/// Ordering is `id ASC`, which mirrors insertion order (`AUTOINCREMENT`).
pub struct QueueStore {
    db: Arc<Db>,
}

impl QueueStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub fn depth_for_machine(&self, machine_id: &str) -> rusqlite::Result<usize> {
        let conn = self.db.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM command_queue WHERE machine_id = ?1",
            params![machine_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as usize)
    }

    pub fn enqueue(
        &self,
        machine_id: &str,
        session_id: &str,
        command_text: &str,
        chat_id: &str,
    ) -> rusqlite::Result<i64> {
        let conn = self.db.conn.lock();
        conn.execute(
            "INSERT INTO command_queue (machine_id, session_id, command_text, chat_id, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'queued')",
            params![machine_id, session_id, command_text, chat_id, now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// FIFO snapshot of everything still `queued` for a machine, in insertion order.
    pub fn queued_for_machine(&self, machine_id: &str) -> rusqlite::Result<Vec<CommandQueueEntry>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, machine_id, session_id, command_text, chat_id, created_at, status, sent_at
             FROM command_queue WHERE machine_id = ?1 AND status = 'queued' ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![machine_id], row_to_entry)?;
        rows.collect()
    }

    pub fn mark_sent(&self, id: i64) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "UPDATE command_queue SET status = 'sent', sent_at = ?1 WHERE id = ?2",
            params![now(), id],
        )?;
        Ok(())
    }

    /// Permanently remove an entry once the Agent's durable ack has arrived.
    pub fn ack(&self, machine_id: &str, session_id: &str, command_id: &str) -> rusqlite::Result<()> {
        // command_id is the queue row's rowid, stringified, by construction (see hub::MachineHub).
        let Ok(id) = command_id.parse::<i64>() else { return Ok(()) };
        let conn = self.db.conn.lock();
        conn.execute(
            "DELETE FROM command_queue WHERE id = ?1 AND machine_id = ?2 AND session_id = ?3",
            params![id, machine_id, session_id],
        )?;
        Ok(())
    }

    /// Remove by queue id and machine id alone, for the case where the ack
    /// arrives without session context (the duplex handler only has `machine_id`).
    pub fn ack_by_id(&self, machine_id: &str, command_id: &str) -> rusqlite::Result<()> {
        let Ok(id) = command_id.parse::<i64>() else { return Ok(()) };
        let conn = self.db.conn.lock();
        conn.execute(
            "DELETE FROM command_queue WHERE id = ?1 AND machine_id = ?2",
            params![id, machine_id],
        )?;
        Ok(())
    }

    /// Dead-letter anything older than `dead_letter_secs`, regardless of status.
    /// Returns the count removed.
    pub fn dead_letter_sweep(&self, dead_letter_secs: i64) -> rusqlite::Result<usize> {
        let conn = self.db.conn.lock();
        conn.execute(
            "DELETE FROM command_queue WHERE created_at < ?1",
            params![now() - dead_letter_secs],
        )
    }

    /// Snapshot of `(id, machine_id)` for `sent` entries outstanding beyond
    /// `sent_timeout_secs`, for the caller to cross-check against connection
    /// state before requeuing — a `sent` entry alone doesn't mean delivery
    /// failed, only that no ack has arrived yet.
    pub fn timed_out_sent(&self, sent_timeout_secs: i64) -> rusqlite::Result<Vec<(i64, String)>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, machine_id FROM command_queue WHERE status = 'sent' AND sent_at < ?1",
        )?;
        let rows = stmt.query_map(params![now() - sent_timeout_secs], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        rows.collect()
    }

    /// Move a single `sent` entry back to `queued`, e.g. after its machine's
    /// connection was found to have dropped.
    pub fn requeue(&self, id: i64) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "UPDATE command_queue SET status = 'queued', sent_at = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommandQueueEntry> {
    Ok(CommandQueueEntry {
        id: row.get(0)?,
        machine_id: row.get(1)?,
        session_id: row.get(2)?,
        command_text: row.get(3)?,
        chat_id: row.get(4)?,
        created_at: row.get(5)?,
        status: QueueStatus::from_str(&row.get::<_, String>(6)?),
        sent_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let store = QueueStore::new(Arc::new(Db::open_in_memory().unwrap()));
        store.enqueue("m1", "s1", "A", "c1").unwrap();
        store.enqueue("m1", "s1", "B", "c1").unwrap();
        store.enqueue("m1", "s1", "C", "c1").unwrap();
        let queued = store.queued_for_machine("m1").unwrap();
        let texts: Vec<_> = queued.iter().map(|e| e.command_text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
    }

    #[test]
    fn ack_removes_only_matching_entry() {
        let store = QueueStore::new(Arc::new(Db::open_in_memory().unwrap()));
        let id = store.enqueue("m1", "s1", "A", "c1").unwrap();
        store.mark_sent(id).unwrap();
        store.ack("m1", "s1", &id.to_string()).unwrap();
        assert_eq!(store.depth_for_machine("m1").unwrap(), 0);
    }
}
