// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the Edge Router, covering the end-to-end scenarios
//! from the notification/remote-control spec. Uses `axum_test::TestServer` —
//! no real TCP needed — the same shape as `mux`'s own `tests/http.rs`.

use std::sync::Arc;

use async_trait::async_trait;
use axum_test::TestServer;
use relay_wire::http::ReplyMarkup;
use relay_wire::RouterFrame;
use serial_test::serial;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use relay_hub::chat::{ChatCapabilities, ChatProvider};
use relay_hub::config::RouterConfig;
use relay_hub::db::Db;
use relay_hub::state::RouterState;
use relay_hub::transport::build_router;

struct MockChat;

#[async_trait]
impl ChatProvider for MockChat {
    fn capabilities(&self) -> ChatCapabilities {
        ChatCapabilities { inline_keyboards: true }
    }

    async fn send_text(&self, _chat_id: &str, _text: &str, _markup: Option<&ReplyMarkup>) -> anyhow::Result<String> {
        Ok("msg-1".into())
    }
}

fn test_config(db_path: std::path::PathBuf) -> RouterConfig {
    RouterConfig {
        host: "127.0.0.1".into(),
        port: 0,
        shared_api_key: "k".into(),
        bot_token: "dummy".into(),
        webhook_secret: "s".into(),
        webhook_path_secret: None,
        allowed_chat_ids: vec!["chatA".into()],
        allowed_user_ids: vec!["user1".into()],
        max_command_length_bytes: 10_240,
        max_queue_per_machine: 3,
        max_total_sessions: 1_000,
        session_ttl_secs: 86_400,
        seen_update_retention_secs: 3_600,
        retry_sweep_secs: 3_600,
        sent_timeout_secs: 300,
        dead_letter_secs: 86_400,
        db_path,
        shutdown_drain_secs: 10,
    }
}

fn test_state(db_path: std::path::PathBuf) -> Arc<RouterState> {
    let db = Arc::new(Db::open(&db_path).unwrap());
    Arc::new(RouterState::new(test_config(db_path), db, Arc::new(MockChat), CancellationToken::new()))
}

fn test_server(state: Arc<RouterState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}

fn bearer() -> (axum::http::HeaderName, axum::http::HeaderValue) {
    (axum::http::header::AUTHORIZATION, axum::http::HeaderValue::from_static("Bearer k"))
}

#[tokio::test]
async fn sessions_register_list_unregister_round_trip() {
    let dir = tempdir().unwrap();
    let state = test_state(dir.path().join("hub.db"));
    let server = test_server(Arc::clone(&state));
    let (name, value) = bearer();

    let resp = server
        .post("/sessions")
        .add_header(name.clone(), value.clone())
        .json(&serde_json::json!({ "session_id": "s1", "machine_id": "m1" }))
        .await;
    resp.assert_status_ok();

    let resp = server.get("/sessions").add_header(name.clone(), value.clone()).await;
    resp.assert_status_ok();
    let sessions: Vec<serde_json::Value> = resp.json();
    assert_eq!(sessions.len(), 1);

    let resp = server
        .post("/sessions/unregister")
        .add_header(name.clone(), value.clone())
        .json(&serde_json::json!({ "session_id": "s1" }))
        .await;
    resp.assert_status_ok();

    let resp = server.get("/sessions").add_header(name, value).await;
    let sessions: Vec<serde_json::Value> = resp.json();
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn requests_without_bearer_are_rejected() {
    let dir = tempdir().unwrap();
    let state = test_state(dir.path().join("hub.db"));
    let server = test_server(state);

    let resp = server.get("/sessions").await;
    resp.assert_status(axum::http::StatusCode::UNAUTHORIZED);
}

/// Scenario: a notification binds a reply-token to a session/chat pair; the
/// Router's mirror then validates it for that chat and rejects it for any
/// other, without revealing the token exists elsewhere (spec.md §8 #4).
#[tokio::test]
async fn notification_token_is_bound_to_its_chat() {
    let dir = tempdir().unwrap();
    let state = test_state(dir.path().join("hub.db"));
    let server = test_server(Arc::clone(&state));
    let (name, value) = bearer();

    server
        .post("/sessions")
        .add_header(name.clone(), value.clone())
        .json(&serde_json::json!({ "session_id": "s1", "machine_id": "m1" }))
        .await
        .assert_status_ok();

    server
        .post("/notifications")
        .add_header(name, value)
        .json(&serde_json::json!({
            "session_id": "s1",
            "chat_id": "chatA",
            "text": "done",
            "reply_token": "tok-abc123",
        }))
        .await
        .assert_status_ok();

    use relay_hub::store::TokenValidation;
    assert_eq!(
        state.tokens.validate("tok-abc123", "chatA").unwrap(),
        TokenValidation::Valid { session_id: "s1".into() }
    );
    assert_eq!(state.tokens.validate("tok-abc123", "chatB").unwrap(), TokenValidation::ChatIdMismatch);
}

/// Scenario 2: offline delivery. Three commands queued in order while the
/// machine is disconnected; on reconnect they flush in FIFO order and the
/// queue drains.
#[tokio::test]
async fn offline_commands_flush_in_order_on_reconnect() {
    let dir = tempdir().unwrap();
    let state = test_state(dir.path().join("hub.db"));

    let a = state.queue.enqueue("m1", "s1", "A", "chatA").unwrap();
    let b = state.queue.enqueue("m1", "s1", "B", "chatA").unwrap();
    let c = state.queue.enqueue("m1", "s1", "C", "chatA").unwrap();
    assert!(a < b && b < c);
    assert_eq!(state.queue.queued_for_machine("m1").unwrap().len(), 3);

    let (_generation, mut rx) = state.connections.install("m1").await;
    relay_hub::transport::http::flush_queue(&state, "m1").await.unwrap();

    assert!(state.queue.queued_for_machine("m1").unwrap().is_empty());

    let mut received = Vec::new();
    for _ in 0..3 {
        match rx.recv().await {
            Some(relay_hub::hub::Outbound::Frame(RouterFrame::Command { command, .. })) => received.push(command),
            other => panic!("expected a command frame, got something else: {}", other.is_some()),
        }
    }
    assert_eq!(received, vec!["A", "B", "C"]);
}

/// Boundary: the queue accepts exactly `max_queue_per_machine` entries and
/// the cap itself never silently grows past it via raw enqueue calls.
#[tokio::test]
async fn queue_depth_cap_boundary() {
    let dir = tempdir().unwrap();
    let state = test_state(dir.path().join("hub.db"));
    for i in 0..3 {
        state.queue.enqueue("m1", "s1", &format!("cmd{i}"), "chatA").unwrap();
    }
    assert_eq!(state.queue.depth_for_machine("m1").unwrap(), state.config.max_queue_per_machine);
}

/// Scenario 5: webhook update-id dedup. Recording the same `update_id` twice
/// within retention only reports "new" once.
#[tokio::test]
async fn duplicate_update_id_is_recorded_once() {
    let dir = tempdir().unwrap();
    let state = test_state(dir.path().join("hub.db"));
    assert!(state.seen.record_if_new("upd-1").unwrap());
    assert!(!state.seen.record_if_new("upd-1").unwrap());
    assert!(!state.seen.record_if_new("upd-1").unwrap());
}

proptest::proptest! {
    /// Round-trip law: `enqueue` preserves FIFO order no matter how many
    /// entries land in the queue before the first read.
    #[test]
    fn queue_preserves_fifo_order(commands in proptest::collection::vec("[a-z0-9]{1,12}", 1..20)) {
        let dir = tempdir().unwrap();
        let db = Db::open(&dir.path().join("hub.db")).unwrap();
        let store = relay_hub::store::QueueStore::new(std::sync::Arc::new(db));
        for cmd in &commands {
            store.enqueue("m1", "s1", cmd, "chatA").unwrap();
        }
        let queued = store.queued_for_machine("m1").unwrap();
        let texts: Vec<_> = queued.iter().map(|e| e.command_text.clone()).collect();
        proptest::prop_assert_eq!(texts, commands);
    }
}

/// A file-backed database survives reopening with its data intact — the
/// consolidated single-file store the spec requires in place of flat JSON
/// files guarded by a mutex.
#[tokio::test]
#[serial]
async fn file_backed_db_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hub.db");
    {
        let db = Arc::new(Db::open(&path).unwrap());
        let store = relay_hub::store::SessionStore::new(Arc::clone(&db));
        store.upsert("s1", "m1", Some("label")).unwrap();
    }
    let db = Arc::new(Db::open(&path).unwrap());
    let store = relay_hub::store::SessionStore::new(db);
    let session = store.get("s1").unwrap().expect("session should survive reopen");
    assert_eq!(session.machine_id, "m1");
}

/// Config is parsed from environment variables (clap's `env = "..."`); this
/// mutates process-global env so it must not run concurrently with other
/// env-reading tests.
#[test]
#[serial]
fn config_parses_from_environment() {
    use clap::Parser;

    std::env::set_var("RELAY_HUB_SHARED_API_KEY", "env-key");
    std::env::set_var("RELAY_HUB_BOT_TOKEN", "env-token");
    std::env::set_var("RELAY_HUB_WEBHOOK_SECRET", "env-secret");
    std::env::set_var("RELAY_HUB_ALLOWED_CHAT_IDS", "chatA,chatB");

    let config = RouterConfig::parse_from(["relay-hub"]);

    assert_eq!(config.shared_api_key, "env-key");
    assert_eq!(config.bot_token, "env-token");
    assert_eq!(config.allowed_chat_ids, vec!["chatA", "chatB"]);

    std::env::remove_var("RELAY_HUB_SHARED_API_KEY");
    std::env::remove_var("RELAY_HUB_BOT_TOKEN");
    std::env::remove_var("RELAY_HUB_WEBHOOK_SECRET");
    std::env::remove_var("RELAY_HUB_ALLOWED_CHAT_IDS");
}
