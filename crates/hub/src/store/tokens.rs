// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use rusqlite::params;

use crate::db::{now, Db};

/// Outcome of validating a reply-token against a claimed chat id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidation {
    Valid { session_id: String },
    NotFound,
    Expired,
    ChatIdMismatch,
}

/// Router-side mirror of reply-token bindings minted by the Agent's Registry.
/// The Router needs this to route `/cmd TOKEN text` and inline-keyboard
/// callbacks to a session without a synchronous round trip back to the
/// machine that minted the token (see DESIGN.md).
pub struct TokenStore {
    db: Arc<Db>,
}

impl TokenStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub fn bind(
        &self,
        token: &str,
        session_id: &str,
        chat_id: &str,
        ttl_secs: i64,
    ) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "INSERT INTO reply_tokens (token, session_id, chat_id, expires_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(token) DO UPDATE SET session_id = excluded.session_id,
                chat_id = excluded.chat_id, expires_at = excluded.expires_at",
            params![token, session_id, chat_id, now() + ttl_secs],
        )?;
        Ok(())
    }

    /// Existence, expiry, and chat-id binding are checked; a mismatch on any
    /// is reported distinctly but never reveals whether the token exists in a
    /// different chat (the message text shown to the user must stay generic).
    pub fn validate(&self, token: &str, chat_id: &str) -> rusqlite::Result<TokenValidation> {
        let conn = self.db.conn.lock();
        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT session_id, chat_id, expires_at FROM reply_tokens WHERE token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional_or_none()?;

        let Some((session_id, bound_chat_id, expires_at)) = row else {
            return Ok(TokenValidation::NotFound);
        };
        if now() >= expires_at {
            return Ok(TokenValidation::Expired);
        }
        if bound_chat_id != chat_id {
            return Ok(TokenValidation::ChatIdMismatch);
        }
        Ok(TokenValidation::Valid { session_id })
    }

    pub fn cleanup_expired(&self) -> rusqlite::Result<usize> {
        let conn = self.db.conn.lock();
        conn.execute("DELETE FROM reply_tokens WHERE expires_at <= ?1", params![now()])
    }
}

/// Small helper trait so `query_row`'s `QueryReturnedNoRows` reads as `None`
/// without importing `rusqlite::OptionalExtension` just for one call site.
trait OptionalOrNone<T> {
    fn optional_or_none(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalOrNone<T> for rusqlite::Result<T> {
    fn optional_or_none(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_chat_id_is_distinct_from_not_found() {
        let store = TokenStore::new(Arc::new(Db::open_in_memory().unwrap()));
        store.bind("tok1", "s1", "chatA", 3600).unwrap();
        assert_eq!(store.validate("tok1", "chatB").unwrap(), TokenValidation::ChatIdMismatch);
        assert_eq!(store.validate("nope", "chatA").unwrap(), TokenValidation::NotFound);
    }

    #[test]
    fn expired_token_rejected_even_with_right_chat() {
        let store = TokenStore::new(Arc::new(Db::open_in_memory().unwrap()));
        store.bind("tok1", "s1", "chatA", -1).unwrap();
        assert_eq!(store.validate("tok1", "chatA").unwrap(), TokenValidation::Expired);
    }
}
