// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivers text into a terminal-multiplexer pane via `tmux send-keys -l`.
//! Grounded on `cli::pty::attach::TmuxBackend`'s subprocess-invocation shape.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{InjectError, Inject};
use crate::registry::TransportDescriptor;

pub struct MultiplexerInjector {
    timeout: Duration,
}

impl MultiplexerInjector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Inject for MultiplexerInjector {
    async fn inject(&self, descriptor: &TransportDescriptor, text: &str) -> Result<(), InjectError> {
        let TransportDescriptor::TerminalMultiplexer { pane_identifier, session_name } = descriptor else {
            return Err(InjectError::NoTransport);
        };
        // `pane_identifier` (tmux's own `%N` pane id) is globally addressable
        // and the preferred target; `session_name` is only a fallback for
        // descriptors recorded before the pane id was known.
        let target = if !pane_identifier.is_empty() {
            pane_identifier.clone()
        } else if let Some(name) = session_name {
            name.clone()
        } else {
            return Err(InjectError::NoTransport);
        };
        tokio::time::timeout(self.timeout, send_keys(&target, text))
            .await
            .map_err(|_| InjectError::Timeout(self.timeout))?
    }
}

async fn send_keys(target: &str, text: &str) -> Result<(), InjectError> {
    let status = Command::new("tmux")
        .args(["send-keys", "-t", target, "-l", text])
        .status()
        .await
        .map_err(|e| InjectError::Adapter(e.to_string()))?;
    if !status.success() {
        return Err(InjectError::Adapter(format!("tmux send-keys exited with {status}")));
    }
    let enter = Command::new("tmux")
        .args(["send-keys", "-t", target, "Enter"])
        .status()
        .await
        .map_err(|e| InjectError::Adapter(e.to_string()))?;
    if !enter.success() {
        return Err(InjectError::Adapter(format!("tmux send-keys (Enter) exited with {enter}")));
    }
    Ok(())
}
