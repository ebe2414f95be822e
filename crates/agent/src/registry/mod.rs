// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workstation's source of truth for live sessions. Grounded on the
//! teacher's `SessionEntry`/`state.rs` shape (an `Arc<RwLock<...>>` index
//! backed by durable storage), generalized from PTY-proxy sessions to AI
//! coding sessions with a notify flag and a transport descriptor.

pub mod token;

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::{now, Db};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopped,
}

impl SessionState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "stopped" => Self::Stopped,
            _ => Self::Running,
        }
    }
}

/// A session's terminal-locating descriptor. Priority order on fallback
/// selection: editor-rpc > multiplexer > pty (`spec.md §4.3 upsert`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransportDescriptor {
    TerminalEditorRpc { socket_path: String, buffer_identifier: String },
    TerminalMultiplexer { pane_identifier: String, session_name: Option<String> },
    PseudoTerminal { device_path: String },
    Unknown,
}

impl From<relay_wire::http::TransportDescriptorDto> for TransportDescriptor {
    fn from(dto: relay_wire::http::TransportDescriptorDto) -> Self {
        use relay_wire::http::TransportDescriptorDto as Dto;
        match dto {
            Dto::TerminalEditorRpc { socket_path, buffer_identifier, .. } => {
                Self::TerminalEditorRpc { socket_path, buffer_identifier }
            }
            Dto::TerminalMultiplexer { pane_identifier, session_name } => {
                Self::TerminalMultiplexer { pane_identifier, session_name }
            }
            Dto::PseudoTerminal { device_path } => Self::PseudoTerminal { device_path },
            Dto::Unknown => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub parent_pid: Option<i32>,
    pub pid: Option<i32>,
    pub start_time: Option<i64>,
    pub cwd: Option<String>,
    pub label: Option<String>,
    pub notify: bool,
    pub transport: TransportDescriptor,
    /// A `terminal-editor-rpc` descriptor may carry this as its fallback.
    pub fallback_transport: Option<TransportDescriptor>,
    pub state: SessionState,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen: i64,
    pub expires_at: i64,
}

/// Fields accepted by `upsert`; absent fields merge with the existing record.
#[derive(Debug, Clone, Default)]
pub struct UpsertFields {
    pub parent_pid: Option<i32>,
    pub pid: Option<i32>,
    pub start_time: Option<i64>,
    pub cwd: Option<String>,
    pub label: Option<String>,
    pub notify: Option<bool>,
    pub transport: Option<TransportDescriptor>,
    /// Explicit fallback, e.g. an editor-rpc session-start that also reports
    /// the multiplexer pane it's running inside. Overrides the inferred
    /// carry-forward fallback when set.
    pub fallback_transport: Option<TransportDescriptor>,
}

pub struct SessionRegistry {
    db: Arc<Db>,
}

impl SessionRegistry {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Merge `fields` into the existing session (if any), recomputing the
    /// transport descriptor by priority and preserving a fallback when the
    /// new primary is `terminal-editor-rpc` and a multiplexer descriptor was
    /// already on file.
    pub fn upsert(&self, session_id: &str, fields: UpsertFields, ttl_secs: i64) -> rusqlite::Result<Session> {
        let conn = self.db.conn.lock();
        let ts = now();
        let existing = get_locked(&conn, session_id)?;

        let transport = fields.transport.clone().or_else(|| existing.as_ref().map(|s| s.transport.clone())).unwrap_or(TransportDescriptor::Unknown);
        let fallback_transport = if fields.fallback_transport.is_some() {
            fields.fallback_transport.clone()
        } else {
            match (&transport, &existing) {
                (TransportDescriptor::TerminalEditorRpc { .. }, Some(old)) => {
                    old.fallback_transport.clone().or_else(|| match &old.transport {
                        m @ TransportDescriptor::TerminalMultiplexer { .. } => Some(m.clone()),
                        _ => None,
                    })
                }
                (TransportDescriptor::TerminalEditorRpc { .. }, None) => None,
                _ => existing.as_ref().and_then(|s| s.fallback_transport.clone()),
            }
        };

        let transport_json = serde_json::to_string(&transport).unwrap_or_default();
        let fallback_json = fallback_transport.as_ref().map(|t| serde_json::to_string(t).unwrap_or_default());

        let parent_pid = fields.parent_pid.or_else(|| existing.as_ref().and_then(|s| s.parent_pid));
        let pid = fields.pid.or_else(|| existing.as_ref().and_then(|s| s.pid));
        let start_time = fields.start_time.or_else(|| existing.as_ref().and_then(|s| s.start_time));
        let cwd = fields.cwd.or_else(|| existing.as_ref().and_then(|s| s.cwd.clone()));
        let label = fields.label.or_else(|| existing.as_ref().and_then(|s| s.label.clone()));
        let notify = fields.notify.unwrap_or_else(|| existing.as_ref().map(|s| s.notify).unwrap_or(false));
        let created_at = existing.as_ref().map(|s| s.created_at).unwrap_or(ts);
        let state = existing.as_ref().map(|s| s.state).unwrap_or(SessionState::Running);
        let last_seen = ts;
        let expires_at = ts + ttl_secs;

        conn.execute(
            "INSERT INTO sessions (session_id, parent_pid, pid, start_time, cwd, label, notify,
                transport_json, fallback_transport_json, state, created_at, updated_at, last_seen, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?11, ?12)
             ON CONFLICT(session_id) DO UPDATE SET
                parent_pid = excluded.parent_pid, pid = excluded.pid, start_time = excluded.start_time,
                cwd = excluded.cwd, label = excluded.label, notify = excluded.notify,
                transport_json = excluded.transport_json, fallback_transport_json = excluded.fallback_transport_json,
                updated_at = excluded.updated_at, last_seen = excluded.last_seen, expires_at = excluded.expires_at",
            params![
                session_id, parent_pid, pid, start_time, cwd, label, notify as i64,
                transport_json, fallback_json, state.as_str(), ts, expires_at
            ],
        )?;

        get_locked(&conn, session_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get(&self, session_id: &str) -> rusqlite::Result<Option<Session>> {
        let conn = self.db.conn.lock();
        get_locked(&conn, session_id)
    }

    pub fn get_by_parent_pid(&self, ppid: i32) -> rusqlite::Result<Option<Session>> {
        let conn = self.db.conn.lock();
        let session_id: Option<String> = conn
            .query_row(
                "SELECT session_id FROM sessions WHERE parent_pid = ?1 ORDER BY last_seen DESC LIMIT 1",
                params![ppid],
                |row| row.get(0),
            )
            .optional()?;
        match session_id {
            Some(id) => get_locked(&conn, &id),
            None => Ok(None),
        }
    }

    /// Sorted by descending last-seen, optionally filtered.
    pub fn list(&self, active_only: bool, notify_only: bool) -> rusqlite::Result<Vec<Session>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, parent_pid, pid, start_time, cwd, label, notify,
                transport_json, fallback_transport_json, state, created_at, updated_at, last_seen, expires_at
             FROM sessions ORDER BY last_seen DESC",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        let mut out = Vec::new();
        for row in rows {
            let session = row?;
            if active_only && session.state != SessionState::Running {
                continue;
            }
            if notify_only && !session.notify {
                continue;
            }
            out.push(session);
        }
        Ok(out)
    }

    pub fn touch(&self, session_id: &str, ttl_secs: i64) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        let ts = now();
        conn.execute(
            "UPDATE sessions SET last_seen = ?1, updated_at = ?1, expires_at = ?2 WHERE session_id = ?3",
            params![ts, ts + ttl_secs, session_id],
        )?;
        Ok(())
    }

    /// Opt-in step: sets the notify flag on a known session. Returns `Ok(None)`
    /// for an unknown id — this must never accidentally create a session.
    pub fn enable_notify(
        &self,
        session_id: &str,
        label: &str,
        transport: Option<TransportDescriptor>,
    ) -> rusqlite::Result<Option<Session>> {
        let conn = self.db.conn.lock();
        if get_locked(&conn, session_id)?.is_none() {
            return Ok(None);
        }
        let ts = now();
        if let Some(transport) = transport {
            let transport_json = serde_json::to_string(&transport).unwrap_or_default();
            conn.execute(
                "UPDATE sessions SET notify = 1, label = ?1, transport_json = ?2, updated_at = ?3 WHERE session_id = ?4",
                params![label, transport_json, ts, session_id],
            )?;
        } else {
            conn.execute(
                "UPDATE sessions SET notify = 1, label = ?1, updated_at = ?2 WHERE session_id = ?3",
                params![label, ts, session_id],
            )?;
        }
        get_locked(&conn, session_id)
    }

    pub fn stop(&self, session_id: &str) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "UPDATE sessions SET state = 'stopped', updated_at = ?1 WHERE session_id = ?2",
            params![now(), session_id],
        )?;
        Ok(())
    }

    /// Full removal plus cascade deletion of tokens bound to this session.
    pub fn delete(&self, session_id: &str) -> rusqlite::Result<()> {
        let conn = self.db.conn.lock();
        conn.execute("DELETE FROM reply_tokens WHERE session_id = ?1", params![session_id])?;
        conn.execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])?;
        Ok(())
    }

    /// Snapshot of `(session_id, parent_pid, start_time)` for notify-enabled
    /// running sessions with a known parent pid, for the caller to probe
    /// liveness against outside any registry lock.
    pub fn notify_parent_pids(&self) -> rusqlite::Result<Vec<(String, i32, Option<i64>)>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, parent_pid, start_time FROM sessions
             WHERE notify = 1 AND state = 'running' AND parent_pid IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        rows.collect()
    }

    pub fn cleanup_expired(&self) -> rusqlite::Result<usize> {
        let conn = self.db.conn.lock();
        let expired: Vec<String> = {
            let mut stmt = conn.prepare("SELECT session_id FROM sessions WHERE expires_at < ?1")?;
            let rows = stmt.query_map(params![now()], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        for id in &expired {
            conn.execute("DELETE FROM reply_tokens WHERE session_id = ?1", params![id])?;
            conn.execute("DELETE FROM sessions WHERE session_id = ?1", params![id])?;
        }
        Ok(expired.len())
    }
}

fn get_locked(conn: &rusqlite::Connection, session_id: &str) -> rusqlite::Result<Option<Session>> {
    conn.query_row(
        "SELECT session_id, parent_pid, pid, start_time, cwd, label, notify,
            transport_json, fallback_transport_json, state, created_at, updated_at, last_seen, expires_at
         FROM sessions WHERE session_id = ?1",
        params![session_id],
        row_to_session,
    )
    .optional()
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let transport_json: String = row.get(7)?;
    let fallback_json: Option<String> = row.get(8)?;
    Ok(Session {
        session_id: row.get(0)?,
        parent_pid: row.get(1)?,
        pid: row.get(2)?,
        start_time: row.get(3)?,
        cwd: row.get(4)?,
        label: row.get(5)?,
        notify: row.get::<_, i64>(6)? != 0,
        transport: serde_json::from_str(&transport_json).unwrap_or(TransportDescriptor::Unknown),
        fallback_transport: fallback_json.and_then(|j| serde_json::from_str(&j).ok()),
        state: SessionState::from_str(&row.get::<_, String>(9)?),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        last_seen: row.get(12)?,
        expires_at: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_is_idempotent_besides_timestamps() {
        let registry = SessionRegistry::new(Arc::new(Db::open_in_memory().unwrap()));
        let fields = UpsertFields { pid: Some(100), ..Default::default() };
        let a = registry.upsert("s1", fields.clone(), 86_400).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let b = registry.upsert("s1", fields, 86_400).unwrap();
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.pid, b.pid);
        assert!(b.updated_at >= a.updated_at);
    }

    #[test]
    fn enable_notify_on_unknown_id_does_not_create() {
        let registry = SessionRegistry::new(Arc::new(Db::open_in_memory().unwrap()));
        assert!(registry.enable_notify("ghost", "label", None).unwrap().is_none());
        assert!(registry.get("ghost").unwrap().is_none());
    }

    #[test]
    fn editor_rpc_preserves_multiplexer_fallback() {
        let registry = SessionRegistry::new(Arc::new(Db::open_in_memory().unwrap()));
        registry
            .upsert(
                "s1",
                UpsertFields {
                    transport: Some(TransportDescriptor::TerminalMultiplexer {
                        pane_identifier: "%3".into(),
                        session_name: Some("main".into()),
                    }),
                    ..Default::default()
                },
                86_400,
            )
            .unwrap();
        let updated = registry
            .upsert(
                "s1",
                UpsertFields {
                    transport: Some(TransportDescriptor::TerminalEditorRpc {
                        socket_path: "/tmp/nvim.sock".into(),
                        buffer_identifier: "buf1".into(),
                    }),
                    ..Default::default()
                },
                86_400,
            )
            .unwrap();
        assert!(matches!(updated.transport, TransportDescriptor::TerminalEditorRpc { .. }));
        assert!(matches!(updated.fallback_transport, Some(TransportDescriptor::TerminalMultiplexer { .. })));
    }

    #[test]
    fn delete_removes_bound_tokens() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let registry = SessionRegistry::new(Arc::clone(&db));
        registry.upsert("s1", UpsertFields::default(), 86_400).unwrap();
        db.conn
            .lock()
            .execute(
                "INSERT INTO reply_tokens (token, session_id, chat_id, expires_at) VALUES ('t1', 's1', 'c1', 99999999999)",
                [],
            )
            .unwrap();
        registry.delete("s1").unwrap();
        let remaining: i64 =
            db.conn.lock().query_row("SELECT COUNT(*) FROM reply_tokens WHERE session_id = 's1'", [], |r| r.get(0)).unwrap();
        assert_eq!(remaining, 0);
    }
}
