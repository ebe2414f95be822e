// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Configuration for the Edge Router.
#[derive(Debug, Clone, clap::Parser)]
pub struct RouterConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_HUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "RELAY_HUB_PORT")]
    pub port: u16,

    /// Shared bearer key required on all non-webhook, non-health endpoints.
    #[arg(long, env = "RELAY_HUB_SHARED_API_KEY")]
    pub shared_api_key: String,

    /// Chat platform bot token, used for outbound sends.
    #[arg(long, env = "RELAY_HUB_BOT_TOKEN")]
    pub bot_token: String,

    /// Secret the chat platform echoes back in its webhook validation header.
    #[arg(long, env = "RELAY_HUB_WEBHOOK_SECRET")]
    pub webhook_secret: String,

    /// Optional URL path segment that further obscures the webhook endpoint.
    #[arg(long, env = "RELAY_HUB_WEBHOOK_PATH_SECRET")]
    pub webhook_path_secret: Option<String>,

    /// Comma-separated allowlist of chat ids permitted to use the bot.
    /// Empty means fail-closed: no chat is permitted.
    #[arg(long, value_delimiter = ',', env = "RELAY_HUB_ALLOWED_CHAT_IDS")]
    pub allowed_chat_ids: Vec<String>,

    /// Comma-separated allowlist of user ids permitted to use the bot.
    #[arg(long, value_delimiter = ',', env = "RELAY_HUB_ALLOWED_USER_IDS")]
    pub allowed_user_ids: Vec<String>,

    /// Maximum command body length, in bytes.
    #[arg(long, default_value_t = 10_240, env = "RELAY_HUB_MAX_COMMAND_LENGTH_BYTES")]
    pub max_command_length_bytes: usize,

    /// Maximum queued-but-unacked commands per machine.
    #[arg(long, default_value_t = 100, env = "RELAY_HUB_MAX_QUEUE_PER_MACHINE")]
    pub max_queue_per_machine: usize,

    /// Soft cap on total registered sessions.
    #[arg(long, default_value_t = 1_000, env = "RELAY_HUB_MAX_TOTAL_SESSIONS")]
    pub max_total_sessions: usize,

    /// Session staleness TTL, in seconds.
    #[arg(long, default_value_t = 86_400, env = "RELAY_HUB_SESSION_TTL_SECS")]
    pub session_ttl_secs: i64,

    /// Webhook `update_id` dedup retention, in seconds.
    #[arg(long, default_value_t = 3_600, env = "RELAY_HUB_SEEN_UPDATE_RETENTION_SECS")]
    pub seen_update_retention_secs: i64,

    /// Retry sweep interval, in seconds.
    #[arg(long, default_value_t = 3_600, env = "RELAY_HUB_RETRY_SWEEP_SECS")]
    pub retry_sweep_secs: u64,

    /// How long a `sent` queue entry may remain un-acked before the retry sweep
    /// requeues it, in seconds.
    #[arg(long, default_value_t = 300, env = "RELAY_HUB_SENT_TIMEOUT_SECS")]
    pub sent_timeout_secs: i64,

    /// Queue entries older than this are dead-lettered by the retry sweep, in seconds.
    #[arg(long, default_value_t = 86_400, env = "RELAY_HUB_DEAD_LETTER_SECS")]
    pub dead_letter_secs: i64,

    /// Path to the embedded SQLite database file.
    #[arg(long, default_value = "relay-hub.db", env = "RELAY_HUB_DB_PATH")]
    pub db_path: std::path::PathBuf,

    /// On shutdown, how long in-flight requests get to finish before the
    /// process forces an exit, in seconds.
    #[arg(long, default_value_t = 10, env = "RELAY_HUB_SHUTDOWN_DRAIN_SECS")]
    pub shutdown_drain_secs: u64,
}

impl RouterConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs.max(0) as u64)
    }

    pub fn seen_update_retention(&self) -> Duration {
        Duration::from_secs(self.seen_update_retention_secs.max(0) as u64)
    }

    pub fn retry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retry_sweep_secs)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }

    /// Fail-closed allowlist check: an empty allowlist admits nobody.
    pub fn chat_allowed(&self, chat_id: &str) -> bool {
        !self.allowed_chat_ids.is_empty() && self.allowed_chat_ids.iter().any(|c| c == chat_id)
    }

    pub fn user_allowed(&self, user_id: &str) -> bool {
        !self.allowed_user_ids.is_empty() && self.allowed_user_ids.iter().any(|u| u == user_id)
    }
}
