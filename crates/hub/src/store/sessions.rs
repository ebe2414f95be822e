// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};

use crate::db::{now, Db};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RouterSession {
    pub session_id: String,
    pub machine_id: String,
    pub label: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Router-side session→machine index, backed by the `sessions` table.
pub struct SessionStore {
    db: Arc<Db>,
}

impl SessionStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Upsert a session, bumping `updated_at`. Returns the count of distinct
    /// sessions after the write, for the caller to enforce the soft cap against.
    pub fn upsert(
        &self,
        session_id: &str,
        machine_id: &str,
        label: Option<&str>,
    ) -> rusqlite::Result<RouterSession> {
        let conn = self.db.conn.lock();
        let ts = now();
        conn.execute(
            "INSERT INTO sessions (session_id, machine_id, label, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                machine_id = excluded.machine_id,
                label = COALESCE(excluded.label, sessions.label),
                updated_at = excluded.updated_at",
            params![session_id, machine_id, label, ts],
        )?;
        self.get_locked(&conn, session_id)?.ok_or_else(|| {
            rusqlite::Error::QueryReturnedNoRows
        })
    }

    pub fn count(&self) -> rusqlite::Result<usize> {
        let conn = self.db.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
    }

    pub fn get(&self, session_id: &str) -> rusqlite::Result<Option<RouterSession>> {
        let conn = self.db.conn.lock();
        self.get_locked(&conn, session_id)
    }

    fn get_locked(
        &self,
        conn: &rusqlite::Connection,
        session_id: &str,
    ) -> rusqlite::Result<Option<RouterSession>> {
        conn.query_row(
            "SELECT session_id, machine_id, label, created_at, updated_at
             FROM sessions WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok(RouterSession {
                    session_id: row.get(0)?,
                    machine_id: row.get(1)?,
                    label: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()
    }

    pub fn list(&self) -> rusqlite::Result<Vec<RouterSession>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, machine_id, label, created_at, updated_at FROM sessions",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RouterSession {
                session_id: row.get(0)?,
                machine_id: row.get(1)?,
                label: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    pub fn touch(&self, session_id: &str) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE session_id = ?2",
            params![now(), session_id],
        )?;
        Ok(())
    }

    /// Remove a session and every queue entry addressed to it.
    pub fn remove(&self, session_id: &str) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute("DELETE FROM command_queue WHERE session_id = ?1", params![session_id])?;
        conn.execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])?;
        Ok(())
    }

    /// Scheduled GC: drop sessions whose `updated_at` predates the TTL horizon.
    pub fn cleanup_stale(&self, ttl_secs: i64) -> rusqlite::Result<usize> {
        let conn = self.db.conn.lock();
        let horizon = now() - ttl_secs;
        let stale: Vec<String> = {
            let mut stmt = conn.prepare("SELECT session_id FROM sessions WHERE updated_at < ?1")?;
            let rows = stmt.query_map(params![horizon], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        for id in &stale {
            conn.execute("DELETE FROM command_queue WHERE session_id = ?1", params![id])?;
            conn.execute("DELETE FROM sessions WHERE session_id = ?1", params![id])?;
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_is_idempotent_on_fields() {
        let store = SessionStore::new(Arc::new(Db::open_in_memory().unwrap()));
        let a = store.upsert("s1", "m1", Some("label")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = store.upsert("s1", "m1", Some("label")).unwrap();
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.machine_id, b.machine_id);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn remove_cascades_queue_entries() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let store = SessionStore::new(Arc::clone(&db));
        store.upsert("s1", "m1", None).unwrap();
        db.conn
            .lock()
            .execute(
                "INSERT INTO command_queue (machine_id, session_id, command_text, chat_id, created_at, status)
                 VALUES ('m1', 's1', 'x', 'c1', 0, 'queued')",
                [],
            )
            .unwrap();
        store.remove("s1").unwrap();
        let remaining: i64 = db
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM command_queue WHERE session_id = 's1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
