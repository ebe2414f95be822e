// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reply tokens bind a chat reply back to the session that asked for it.
//! Minted here, validated here; the Router keeps only a routing-only mirror
//! (see DESIGN.md, Open Questions #2).

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use rusqlite::{params, OptionalExtension};

use crate::db::{now, Db};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidation {
    Valid { session_id: String, context: Option<String> },
    NotFound,
    Expired,
    ChatIdMismatch,
}

pub struct TokenStore {
    db: Arc<Db>,
}

impl TokenStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// 16 random bytes, URL-safe base64, bound to `(session_id, chat_id, context)`.
    pub fn mint(&self, session_id: &str, chat_id: &str, context: Option<&str>, ttl_secs: i64) -> rusqlite::Result<String> {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        let conn = self.db.conn.lock();
        conn.execute(
            "INSERT INTO reply_tokens (token, session_id, chat_id, context, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![token, session_id, chat_id, context, now() + ttl_secs],
        )?;
        Ok(token)
    }

    pub fn validate(&self, token: &str, chat_id: &str) -> rusqlite::Result<TokenValidation> {
        let conn = self.db.conn.lock();
        let row: Option<(String, String, Option<String>, i64)> = conn
            .query_row(
                "SELECT session_id, chat_id, context, expires_at FROM reply_tokens WHERE token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((session_id, bound_chat_id, context, expires_at)) = row else {
            return Ok(TokenValidation::NotFound);
        };
        if expires_at <= now() {
            return Ok(TokenValidation::Expired);
        }
        if bound_chat_id != chat_id {
            return Ok(TokenValidation::ChatIdMismatch);
        }
        Ok(TokenValidation::Valid { session_id, context })
    }

    pub fn revoke(&self, token: &str) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute("DELETE FROM reply_tokens WHERE token = ?1", params![token])?;
        Ok(())
    }

    pub fn cleanup_expired(&self) -> rusqlite::Result<usize> {
        let conn = self.db.conn.lock();
        conn.execute("DELETE FROM reply_tokens WHERE expires_at < ?1", params![now()])
    }

    /// Binds a `(channel_id, reply_key)` pair to an existing token, for
    /// platforms that key replies by message id rather than token text.
    pub fn bind_reply_key(&self, channel_id: &str, reply_key: &str, token: &str, ttl_secs: i64) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO reply_key_map (channel_id, reply_key, token, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![channel_id, reply_key, token, now() + ttl_secs],
        )?;
        Ok(())
    }

    /// Single-use lookup: the mapping is consumed (deleted) whether or not
    /// it resolved to a live token.
    pub fn consume_reply_key(&self, channel_id: &str, reply_key: &str) -> rusqlite::Result<Option<String>> {
        let conn = self.db.conn.lock();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT token, expires_at FROM reply_key_map WHERE channel_id = ?1 AND reply_key = ?2",
                params![channel_id, reply_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        conn.execute(
            "DELETE FROM reply_key_map WHERE channel_id = ?1 AND reply_key = ?2",
            params![channel_id, reply_key],
        )?;
        match row {
            Some((token, expires_at)) if expires_at > now() => Ok(Some(token)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_validate_same_chat_succeeds() {
        let store = TokenStore::new(Arc::new(Db::open_in_memory().unwrap()));
        let token = store.mint("s1", "chatA", Some("ctx"), 3600).unwrap();
        let result = store.validate(&token, "chatA").unwrap();
        assert_eq!(result, TokenValidation::Valid { session_id: "s1".into(), context: Some("ctx".into()) });
    }

    #[test]
    fn validate_rejects_cross_chat_use() {
        let store = TokenStore::new(Arc::new(Db::open_in_memory().unwrap()));
        let token = store.mint("s1", "chatA", None, 3600).unwrap();
        assert_eq!(store.validate(&token, "chatB").unwrap(), TokenValidation::ChatIdMismatch);
    }

    #[test]
    fn validate_unknown_token_is_not_found() {
        let store = TokenStore::new(Arc::new(Db::open_in_memory().unwrap()));
        assert_eq!(store.validate("nope", "chatA").unwrap(), TokenValidation::NotFound);
    }

    #[test]
    fn expired_token_is_reported_expired() {
        let store = TokenStore::new(Arc::new(Db::open_in_memory().unwrap()));
        let token = store.mint("s1", "chatA", None, -10).unwrap();
        assert_eq!(store.validate(&token, "chatA").unwrap(), TokenValidation::Expired);
    }

    #[test]
    fn revoke_removes_token() {
        let store = TokenStore::new(Arc::new(Db::open_in_memory().unwrap()));
        let token = store.mint("s1", "chatA", None, 3600).unwrap();
        store.revoke(&token).unwrap();
        assert_eq!(store.validate(&token, "chatA").unwrap(), TokenValidation::NotFound);
    }

    #[test]
    fn reply_key_lookup_is_single_use() {
        let store = TokenStore::new(Arc::new(Db::open_in_memory().unwrap()));
        let token = store.mint("s1", "chatA", None, 3600).unwrap();
        store.bind_reply_key("chatA", "msg-42", &token, 3600).unwrap();
        assert_eq!(store.consume_reply_key("chatA", "msg-42").unwrap(), Some(token));
        assert_eq!(store.consume_reply_key("chatA", "msg-42").unwrap(), None);
    }

    #[test]
    fn minted_tokens_are_unique() {
        let store = TokenStore::new(Arc::new(Db::open_in_memory().unwrap()));
        let a = store.mint("s1", "chatA", None, 3600).unwrap();
        let b = store.mint("s1", "chatA", None, 3600).unwrap();
        assert_ne!(a, b);
    }
}
