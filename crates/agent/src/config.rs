// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Configuration for the Machine Agent daemon.
#[derive(Debug, Clone, clap::Parser)]
pub struct AgentConfig {
    /// Base URL of the Edge Router. Absent enables direct-to-chat mode.
    #[arg(long, env = "RELAY_AGENT_EDGE_ROUTER_URL")]
    pub edge_router_url: Option<String>,

    /// Stable identifier for this workstation.
    #[arg(long, env = "RELAY_AGENT_MACHINE_ID")]
    pub machine_id: String,

    /// Shared bearer key presented to the Edge Router.
    #[arg(long, env = "RELAY_AGENT_SHARED_API_KEY", default_value = "")]
    pub shared_api_key: String,

    /// Direct-mode chat bot token, used when `edge_router_url` is unset.
    #[arg(long, env = "RELAY_AGENT_BOT_TOKEN")]
    pub bot_token: Option<String>,

    /// Chat to notify when a session stops or is otherwise flagged. This
    /// workstation is assumed to be linked to one operator's chat, not
    /// dispatched per-session, so the target travels with the Agent's own
    /// configuration rather than the session-start/enable-notify payloads.
    #[arg(long, env = "RELAY_AGENT_DEFAULT_CHAT_ID")]
    pub default_chat_id: Option<String>,

    /// Local HTTP listen address for hooks and plugins.
    #[arg(long, default_value = "127.0.0.1:8787", env = "RELAY_AGENT_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Initial reconnect backoff, in milliseconds.
    #[arg(long, default_value_t = 1_000, env = "RELAY_AGENT_RECONNECT_INITIAL_MS")]
    pub reconnect_initial_ms: u64,

    /// Maximum reconnect backoff, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "RELAY_AGENT_RECONNECT_MAX_MS")]
    pub reconnect_max_ms: u64,

    /// Duplex heartbeat interval, in seconds.
    #[arg(long, default_value_t = 30, env = "RELAY_AGENT_PING_INTERVAL_SECS")]
    pub ping_interval_secs: u64,

    /// Pong timeout before a connection is considered dead, in seconds.
    #[arg(long, default_value_t = 90, env = "RELAY_AGENT_PONG_TIMEOUT_SECS")]
    pub pong_timeout_secs: u64,

    /// Session staleness TTL, in seconds.
    #[arg(long, default_value_t = 86_400, env = "RELAY_AGENT_SESSION_TTL_SECS")]
    pub session_ttl_secs: i64,

    /// Reply-token TTL, in seconds.
    #[arg(long, default_value_t = 86_400, env = "RELAY_AGENT_REPLY_TOKEN_TTL_SECS")]
    pub reply_token_ttl_secs: i64,

    /// How long `done` inbox entries are retained before pruning, in seconds.
    #[arg(long, default_value_t = 3_600, env = "RELAY_AGENT_INBOX_RETENTION_SECS")]
    pub inbox_retention_secs: i64,

    /// Interval between periodic sweeps (inbox prune, session/token cleanup), in seconds.
    #[arg(long, default_value_t = 300, env = "RELAY_AGENT_SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: u64,

    /// Deadline given to a single injector call before it is considered failed, in seconds.
    #[arg(long, default_value_t = 10, env = "RELAY_AGENT_INJECT_TIMEOUT_SECS")]
    pub inject_timeout_secs: u64,

    /// Tolerance, in seconds, when matching a process start time during dead-session detection.
    #[arg(long, default_value_t = 2, env = "RELAY_AGENT_START_TIME_TOLERANCE_SECS")]
    pub start_time_tolerance_secs: i64,

    /// Path to the embedded SQLite database file.
    #[arg(long, default_value = "relay-agent.db", env = "RELAY_AGENT_DB_PATH")]
    pub db_path: std::path::PathBuf,

    /// On shutdown, how long in-flight injector calls get to finish before
    /// the process forces an exit, in seconds.
    #[arg(long, default_value_t = 10, env = "RELAY_AGENT_SHUTDOWN_DRAIN_SECS")]
    pub shutdown_drain_secs: u64,
}

impl AgentConfig {
    pub fn router_mode(&self) -> bool {
        self.edge_router_url.is_some()
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn inject_timeout(&self) -> Duration {
        Duration::from_secs(self.inject_timeout_secs)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }

    /// Duplex URL derived from the configured HTTP(S) base.
    pub fn duplex_url(&self) -> Option<String> {
        let base = self.edge_router_url.as_deref()?;
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return None;
        };
        Some(format!("{}/duplex?machine_id={}", ws_base.trim_end_matches('/'), self.machine_id))
    }
}
