// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the Machine Agent, covering the end-to-end scenarios
//! from the notification/remote-control spec. Uses `axum_test::TestServer` —
//! no real TCP needed — the same shape as `relay-hub`'s `tests/scenarios.rs`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use relay_wire::http::{SessionView, StopResponse, TokenValidateResponse};
use serial_test::serial;
use tempfile::tempdir;

use relay_agent::config::AgentConfig;
use relay_agent::db::Db;
use relay_agent::inbox::{InboxStore, InsertOutcome};
use relay_agent::process::is_alive;
use relay_agent::registry::token::{TokenStore, TokenValidation};
use relay_agent::registry::{SessionRegistry, UpsertFields};
use relay_agent::state::AgentState;
use relay_agent::transport::build_router;

fn test_config(db_path: PathBuf) -> AgentConfig {
    AgentConfig {
        edge_router_url: None,
        machine_id: "m1".into(),
        shared_api_key: String::new(),
        bot_token: None,
        default_chat_id: None,
        listen_addr: "127.0.0.1:0".into(),
        reconnect_initial_ms: 1_000,
        reconnect_max_ms: 30_000,
        ping_interval_secs: 30,
        pong_timeout_secs: 90,
        session_ttl_secs: 86_400,
        reply_token_ttl_secs: 86_400,
        inbox_retention_secs: 3_600,
        sweep_interval_secs: 300,
        inject_timeout_secs: 10,
        start_time_tolerance_secs: 2,
        db_path,
        shutdown_drain_secs: 10,
    }
}

fn test_state(db_path: PathBuf) -> Arc<AgentState> {
    AgentState::new(test_config(db_path), None).unwrap()
}

fn test_server(state: Arc<AgentState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}

#[tokio::test]
async fn session_lifecycle_start_heartbeat_stop_delete() {
    let dir = tempdir().unwrap();
    let server = test_server(test_state(dir.path().join("agent.db")));

    let resp = server
        .post("/session-start")
        .json(&serde_json::json!({ "session_id": "s1", "pid": 42, "cwd": "/tmp" }))
        .await;
    resp.assert_status_ok();
    let view: SessionView = resp.json();
    assert_eq!(view.state, "running");

    server.post("/sessions/s1/heartbeat").await.assert_status_ok();

    let resp = server.post("/stop").json(&serde_json::json!({ "session_id": "s1", "event": "done" })).await;
    resp.assert_status_ok();
    let body: StopResponse = resp.json();
    assert!(body.ok);
    assert!(!body.notified);

    server.delete("/sessions/s1").await.assert_status_ok();
    server.get("/sessions/s1").await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn heartbeat_on_unknown_session_is_404() {
    let dir = tempdir().unwrap();
    let server = test_server(test_state(dir.path().join("agent.db")));
    server.post("/sessions/ghost/heartbeat").await.assert_status(StatusCode::NOT_FOUND);
}

/// Scenario 3: the same `command_id` delivered twice (e.g. after a reconnect
/// replay) produces exactly one inbox row, not two.
#[tokio::test]
async fn duplicate_command_id_produces_single_inbox_row() {
    let dir = tempdir().unwrap();
    let db = Arc::new(Db::open(&dir.path().join("agent.db")).unwrap());
    let inbox = InboxStore::new(Arc::clone(&db));

    assert_eq!(inbox.insert_if_absent("cmd-1", r#"{"text":"run tests"}"#).unwrap(), InsertOutcome::Inserted);
    assert_eq!(inbox.insert_if_absent("cmd-1", r#"{"text":"run tests"}"#).unwrap(), InsertOutcome::AlreadyPresent);
    assert_eq!(inbox.pending().unwrap().len(), 1);
}

/// Scenario 6: a session whose parent pid is no longer alive is removed on
/// sweep, cascading its bound reply token along with it.
#[tokio::test]
async fn dead_parent_pid_session_is_deleted_with_its_token() {
    let dir = tempdir().unwrap();
    let db = Arc::new(Db::open(&dir.path().join("agent.db")).unwrap());
    let registry = SessionRegistry::new(Arc::clone(&db));
    let tokens = TokenStore::new(Arc::clone(&db));

    registry
        .upsert("s1", UpsertFields { parent_pid: Some(i32::MAX), notify: Some(true), ..Default::default() }, 86_400)
        .unwrap();
    let token = tokens.mint("s1", "chatA", None, 3600).unwrap();

    let candidates = registry.notify_parent_pids().unwrap();
    assert_eq!(candidates.len(), 1);
    let (session_id, parent_pid, start_time) = &candidates[0];
    assert!(!is_alive(*parent_pid, *start_time, 2));

    registry.delete(session_id).unwrap();

    assert!(registry.get("s1").unwrap().is_none());
    assert_eq!(tokens.validate(&token, "chatA").unwrap(), TokenValidation::NotFound);
}

/// A live parent pid (the test process itself) is never swept.
#[tokio::test]
async fn live_parent_pid_session_survives_sweep_check() {
    let dir = tempdir().unwrap();
    let db = Arc::new(Db::open(&dir.path().join("agent.db")).unwrap());
    let registry = SessionRegistry::new(Arc::clone(&db));

    registry
        .upsert("s1", UpsertFields { parent_pid: Some(std::process::id() as i32), notify: Some(true), ..Default::default() }, 86_400)
        .unwrap();

    let candidates = registry.notify_parent_pids().unwrap();
    let (_, parent_pid, start_time) = &candidates[0];
    assert!(is_alive(*parent_pid, *start_time, 2));
}

/// Round trip: a minted token validates for its own chat, is rejected for any
/// other, and stops validating at all once revoked.
#[tokio::test]
async fn validate_http_endpoint_reflects_mint_and_revoke() {
    let dir = tempdir().unwrap();
    let state = test_state(dir.path().join("agent.db"));
    let token = state.tokens.mint("s1", "chatA", Some("stopped"), 3600).unwrap();
    let server = test_server(Arc::clone(&state));

    let resp = server.post("/tokens/validate").json(&serde_json::json!({ "token": token, "chat_id": "chatA" })).await;
    resp.assert_status_ok();
    let body: TokenValidateResponse = resp.json();
    assert!(body.valid);
    assert_eq!(body.context.as_deref(), Some("stopped"));

    let resp = server.post("/tokens/validate").json(&serde_json::json!({ "token": token, "chat_id": "chatB" })).await;
    let body: TokenValidateResponse = resp.json();
    assert!(!body.valid);

    state.tokens.revoke(&token).unwrap();
    let resp = server.post("/tokens/validate").json(&serde_json::json!({ "token": token, "chat_id": "chatA" })).await;
    let body: TokenValidateResponse = resp.json();
    assert!(!body.valid);
}

proptest::proptest! {
    /// Round-trip law: a token minted for `(session_id, chat_id)` validates
    /// for that exact chat, whatever arbitrary ids it was minted with.
    #[test]
    fn token_mint_validate_round_trips(
        session_id in "[a-z0-9]{1,12}",
        chat_id in "[a-z0-9]{1,12}",
        other_chat_id in "[a-z0-9]{1,12}",
    ) {
        let dir = tempdir().unwrap();
        let db = std::sync::Arc::new(Db::open(&dir.path().join("agent.db")).unwrap());
        let store = TokenStore::new(db);
        let token = store.mint(&session_id, &chat_id, None, 3600).unwrap();

        proptest::prop_assert_eq!(
            store.validate(&token, &chat_id).unwrap(),
            TokenValidation::Valid { session_id: session_id.clone(), context: None }
        );
        if other_chat_id != chat_id {
            proptest::prop_assert_eq!(store.validate(&token, &other_chat_id).unwrap(), TokenValidation::ChatIdMismatch);
        }
    }
}

/// A file-backed database survives reopening with its sessions and tokens
/// intact — the consolidated single-file store the spec requires in place of
/// the source's three flat-JSON files guarded by a mutex.
#[tokio::test]
#[serial]
async fn file_backed_db_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent.db");
    {
        let db = Arc::new(Db::open(&path).unwrap());
        let registry = SessionRegistry::new(Arc::clone(&db));
        registry.upsert("s1", UpsertFields { pid: Some(42), ..Default::default() }, 86_400).unwrap();
    }
    let db = Arc::new(Db::open(&path).unwrap());
    let registry = SessionRegistry::new(db);
    let session = registry.get("s1").unwrap().expect("session should survive reopen");
    assert_eq!(session.pid, Some(42));
}

/// Config is parsed from environment variables (clap's `env = "..."`); this
/// mutates process-global env so it must not run concurrently with other
/// env-reading tests.
#[test]
#[serial]
fn config_parses_from_environment() {
    use clap::Parser;

    std::env::set_var("RELAY_AGENT_MACHINE_ID", "env-machine");
    std::env::set_var("RELAY_AGENT_EDGE_ROUTER_URL", "https://router.example");

    let config = AgentConfig::parse_from(["relay-agent"]);

    assert_eq!(config.machine_id, "env-machine");
    assert_eq!(config.edge_router_url.as_deref(), Some("https://router.example"));
    assert_eq!(config.duplex_url().as_deref(), Some("wss://router.example/duplex?machine_id=env-machine"));

    std::env::remove_var("RELAY_AGENT_MACHINE_ID");
    std::env::remove_var("RELAY_AGENT_EDGE_ROUTER_URL");
}
