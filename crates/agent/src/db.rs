// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded relational store for the Agent: one SQLite file holding
//! `inbox`, `sessions` (the Registry), `reply_tokens`, and `reply_key_map`.
//! The source keeps these as three separate flat-JSON-file stores guarded by
//! a mutex; consolidated here into one process-local database (`spec.md §9`).

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

pub struct Db {
    pub conn: Mutex<Connection>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS inbox (
        command_id TEXT PRIMARY KEY,
        received_at INTEGER NOT NULL,
        payload_json TEXT NOT NULL,
        status TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        parent_pid INTEGER,
        pid INTEGER,
        start_time INTEGER,
        cwd TEXT,
        label TEXT,
        notify INTEGER NOT NULL DEFAULT 0,
        transport_json TEXT NOT NULL,
        fallback_transport_json TEXT,
        state TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        last_seen INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_parent_pid ON sessions(parent_pid);

    CREATE TABLE IF NOT EXISTS reply_tokens (
        token TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        chat_id TEXT NOT NULL,
        context TEXT,
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_reply_tokens_session ON reply_tokens(session_id);

    CREATE TABLE IF NOT EXISTS reply_key_map (
        channel_id TEXT NOT NULL,
        reply_key TEXT NOT NULL,
        token TEXT NOT NULL,
        expires_at INTEGER NOT NULL,
        PRIMARY KEY (channel_id, reply_key)
    );
";

impl Db {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

/// Current epoch seconds.
pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
