// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic maintenance: expired sessions/tokens, the done-inbox prune, and
//! dead-session detection. Shaped after `relay-hub::retry_sweep`'s
//! snapshot-then-act loop, itself grounded on `mux::upstream::health`.

use std::sync::Arc;

use crate::state::{db_blocking, AgentState};

pub fn spawn(state: Arc<AgentState>) {
    let interval = state.config.sweep_interval();
    let tolerance = state.config.start_time_tolerance_secs;

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            if let Ok(pids) = db_blocking(&state, |s| s.registry.notify_parent_pids()).await {
                for (session_id, parent_pid, start_time) in pids {
                    if !crate::process::is_alive(parent_pid, start_time, tolerance) {
                        tracing::info!(session_id, "dead session detected, removing");
                        let session_id_for_delete = session_id.clone();
                        if let Err(e) = db_blocking(&state, move |s| s.registry.delete(&session_id_for_delete)).await {
                            tracing::warn!(session_id, err = %e, "failed to delete dead session");
                        }
                    }
                }
            }

            match db_blocking(&state, |s| s.registry.cleanup_expired()).await {
                Ok(n) if n > 0 => tracing::info!(removed = n, "expired sessions cleaned up"),
                Err(e) => tracing::warn!(err = %e, "session cleanup failed"),
                _ => {}
            }
            match db_blocking(&state, |s| s.tokens.cleanup_expired()).await {
                Ok(n) if n > 0 => tracing::info!(removed = n, "expired tokens cleaned up"),
                Err(e) => tracing::warn!(err = %e, "token cleanup failed"),
                _ => {}
            }
            let inbox_retention_secs = state.config.inbox_retention_secs;
            match db_blocking(&state, move |s| s.inbox.prune_done(inbox_retention_secs)).await {
                Ok(n) if n > 0 => tracing::info!(removed = n, "done inbox entries pruned"),
                Err(e) => tracing::warn!(err = %e, "inbox prune failed"),
                _ => {}
            }
        }
    });
}
