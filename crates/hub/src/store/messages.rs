// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};

use crate::db::{now, Db};

/// Resolves an outbound chat message id back to the session and chat it
/// notified, so a reply-to-message webhook can route without a token.
pub struct MessageStore {
    db: Arc<Db>,
}

impl MessageStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub fn record(&self, message_id: &str, session_id: &str, chat_id: &str) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "INSERT INTO messages (message_id, session_id, chat_id, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(message_id) DO UPDATE SET session_id = excluded.session_id, chat_id = excluded.chat_id",
            params![message_id, session_id, chat_id, now()],
        )?;
        Ok(())
    }

    /// Resolve `message_id`, scoped by `chat_id` — a cross-chat lookup must
    /// never succeed, since that would leak which session a different chat owns.
    pub fn resolve_scoped(
        &self,
        message_id: &str,
        chat_id: &str,
    ) -> rusqlite::Result<Option<String>> {
        let conn = self.db.conn.lock();
        conn.query_row(
            "SELECT session_id FROM messages WHERE message_id = ?1 AND chat_id = ?2",
            params![message_id, chat_id],
            |row| row.get(0),
        )
        .optional()
    }
}
