// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS process liveness probe for dead-session cleanup. Reads `/proc` rather
//! than sending signal 0, since it also lets us compare a process's actual
//! start time against the one recorded at session-start — a `pid` alone can
//! be reused by an unrelated process between a crash and the next sweep.

/// Returns true if `pid` is running and, when `start_time` is known, its
/// process start time matches within `tolerance_secs`.
pub fn is_alive(pid: i32, start_time: Option<i64>, tolerance_secs: i64) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    let Some(start_time) = start_time else {
        return true;
    };
    let Some(observed) = process_start_epoch(&stat) else {
        return true;
    };
    (observed - start_time).abs() <= tolerance_secs
}

/// Parse field 22 (`starttime`, in clock ticks since boot) out of `/proc/<pid>/stat`
/// and convert it to an epoch-seconds timestamp. The command name in field 2 is
/// parenthesized and may itself contain spaces or parens, so fields are counted
/// from the last `)` rather than by naive whitespace-splitting.
fn process_start_epoch(stat: &str) -> Option<i64> {
    let after_comm = stat.rfind(')').map(|i| &stat[i + 1..])?;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let starttime_ticks: u64 = fields.get(19)?.parse().ok()?;
    let ticks_per_sec = 100u64;
    let boot_time = boot_time_epoch()?;
    Some(boot_time + (starttime_ticks / ticks_per_sec) as i64)
}

fn boot_time_epoch() -> Option<i64> {
    let stat = std::fs::read_to_string("/proc/stat").ok()?;
    stat.lines().find_map(|line| line.strip_prefix("btime ").and_then(|v| v.trim().parse().ok()))
}
