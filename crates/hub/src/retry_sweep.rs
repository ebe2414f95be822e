// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic retry sweep: requeues `sent` entries outstanding past their
//! timeout whose machine connection has dropped, and dead-letters anything
//! that has overstayed its welcome regardless of status, the same
//! "snapshot, act, repeat" shape as `mux::upstream::health::spawn_health_checker`.

use std::sync::Arc;

use crate::state::{db_blocking, RouterState};

pub fn spawn(state: Arc<RouterState>) {
    let interval = state.config.retry_sweep_interval();
    let sent_timeout = state.config.sent_timeout_secs;
    let dead_letter = state.config.dead_letter_secs;

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            let requeued = requeue_for_dropped_connections(&state, sent_timeout).await;

            let dead_lettered = db_blocking(&state, move |s| s.queue.dead_letter_sweep(dead_letter)).await;
            match dead_lettered {
                Ok(dead_lettered) => {
                    if requeued > 0 || dead_lettered > 0 {
                        tracing::info!(requeued, dead_lettered, "retry sweep completed");
                    }
                }
                Err(e) => tracing::warn!(err = %e, "dead-letter sweep failed"),
            }

            let session_ttl_secs = state.config.session_ttl_secs;
            if let Err(e) = db_blocking(&state, move |s| s.sessions.cleanup_stale(session_ttl_secs)).await {
                tracing::warn!(err = %e, "session cleanup failed");
            }
            let seen_update_retention_secs = state.config.seen_update_retention_secs;
            if let Err(e) = db_blocking(&state, move |s| s.seen.cleanup_expired(seen_update_retention_secs)).await {
                tracing::warn!(err = %e, "seen-update cleanup failed");
            }
            if let Err(e) = db_blocking(&state, |s| s.tokens.cleanup_expired()).await {
                tracing::warn!(err = %e, "token cleanup failed");
            }
        }
    });
}

/// Requeue `sent` entries outstanding beyond `sent_timeout_secs`, but only for
/// machines whose connection has actually dropped — a machine can legitimately
/// sit on a command for a while before acking it, so elapsed time alone isn't
/// evidence of a failed delivery. Returns the number requeued.
async fn requeue_for_dropped_connections(state: &Arc<RouterState>, sent_timeout_secs: i64) -> usize {
    let candidates = match db_blocking(state, move |s| s.queue.timed_out_sent(sent_timeout_secs)).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(err = %e, "failed to list timed-out sent entries");
            return 0;
        }
    };

    let mut requeued = 0;
    for (id, machine_id) in candidates {
        if state.connections.is_connected(&machine_id).await {
            continue;
        }
        match db_blocking(state, move |s| s.queue.requeue(id)).await {
            Ok(()) => requeued += 1,
            Err(e) => tracing::warn!(err = %e, id, "failed to requeue entry"),
        }
    }
    requeued
}
