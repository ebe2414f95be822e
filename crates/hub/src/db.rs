// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded relational store for the Router: one SQLite file holding
//! `sessions`, `messages`, `command_queue`, and `seen_updates`.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

pub struct Db {
    pub conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                machine_id TEXT NOT NULL,
                label TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_machine ON sessions(machine_id);

            CREATE TABLE IF NOT EXISTS messages (
                message_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                chat_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id);

            CREATE TABLE IF NOT EXISTS command_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                machine_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                command_text TEXT NOT NULL,
                chat_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                sent_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_queue_machine ON command_queue(machine_id, id);

            CREATE TABLE IF NOT EXISTS seen_updates (
                update_id TEXT PRIMARY KEY,
                received_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reply_tokens (
                token TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                chat_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            CREATE TABLE sessions (
                session_id TEXT PRIMARY KEY, machine_id TEXT NOT NULL, label TEXT,
                created_at INTEGER NOT NULL, updated_at INTEGER NOT NULL
            );
            CREATE TABLE messages (
                message_id TEXT PRIMARY KEY, session_id TEXT NOT NULL,
                chat_id TEXT NOT NULL, created_at INTEGER NOT NULL
            );
            CREATE TABLE command_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT, machine_id TEXT NOT NULL,
                session_id TEXT NOT NULL, command_text TEXT NOT NULL, chat_id TEXT NOT NULL,
                created_at INTEGER NOT NULL, status TEXT NOT NULL, sent_at INTEGER
            );
            CREATE TABLE seen_updates (update_id TEXT PRIMARY KEY, received_at INTEGER NOT NULL);
            CREATE TABLE reply_tokens (
                token TEXT PRIMARY KEY, session_id TEXT NOT NULL,
                chat_id TEXT NOT NULL, expires_at INTEGER NOT NULL
            );
            ",
        )?;
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
