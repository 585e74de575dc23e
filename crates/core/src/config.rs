// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration structs (§6). User-facing values are seconds; everything
//! carried inside the core is integer milliseconds (§9 Design Notes) — the
//! conversion happens once, at construction.

use std::path::PathBuf;

pub const DEFAULT_MAX_REWORK_ATTEMPTS: u32 = 2;
pub const DEFAULT_STALE_MAX_AGE_MS: u64 = 7_200_000;
pub const DEFAULT_COMPLETED_RETENTION_MS: u64 = 604_800_000;
pub const DEFAULT_MONITOR_TICK_MS: u64 = 300_000;

pub const DEFAULT_INACTIVITY_MS: u64 = 120_000;
pub const DEFAULT_MAX_TOTAL_MS: u64 = 7_200_000;
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 600_000;

/// Watchdog tunables (§4.3), stored in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub inactivity_ms: u64,
    pub max_total_ms: u64,
    pub tool_timeout_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            inactivity_ms: DEFAULT_INACTIVITY_MS,
            max_total_ms: DEFAULT_MAX_TOTAL_MS,
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
        }
    }
}

impl WatchdogConfig {
    /// Build from the user-facing seconds fields
    /// (`watchdog.inactivitySec`/`maxTotalSec`/`toolTimeoutSec`).
    pub fn from_raw_seconds(inactivity_sec: u64, max_total_sec: u64, tool_timeout_sec: u64) -> Self {
        Self {
            inactivity_ms: inactivity_sec * 1_000,
            max_total_ms: max_total_sec * 1_000,
            tool_timeout_ms: tool_timeout_sec * 1_000,
        }
    }

    /// Tier 3 of §4.3's config resolution order: hardcoded defaults with
    /// an environment layer folded in, the way `env::ipc_timeout()` does
    /// in the teacher — each var is read, parsed, and silently dropped
    /// back to the default on anything unset or unparseable.
    pub fn from_env() -> Self {
        Self {
            inactivity_ms: env_u64("DISPATCH_WATCHDOG_INACTIVITY_MS", DEFAULT_INACTIVITY_MS),
            max_total_ms: env_u64("DISPATCH_WATCHDOG_MAX_TOTAL_MS", DEFAULT_MAX_TOTAL_MS),
            tool_timeout_ms: env_u64("DISPATCH_WATCHDOG_TOOL_TIMEOUT_MS", DEFAULT_TOOL_TIMEOUT_MS),
        }
    }
}

/// Tiers 1–2 of §4.3's config resolution order: a sparse override read from
/// a per-agent profile document. Every field is optional — an absent field
/// falls through to the caller-supplied config beneath it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialWatchdogConfig {
    pub inactivity_ms: Option<u64>,
    pub max_total_ms: Option<u64>,
    pub tool_timeout_ms: Option<u64>,
}

/// §4.3's full resolution order: per-agent profile override (`profile`,
/// `None` if the lookup found nothing — the lookup itself is a
/// side-effecting read the core never performs or retries here, it only
/// consumes whatever `Option` the caller already resolved) → caller-supplied
/// config (`caller`, itself already resolved against tier 3's hardcoded
/// defaults via [`WatchdogConfig::default`] or [`WatchdogConfig::from_env`]).
pub fn resolve_watchdog_config(profile: Option<PartialWatchdogConfig>, caller: WatchdogConfig) -> WatchdogConfig {
    let Some(profile) = profile else {
        return caller;
    };
    WatchdogConfig {
        inactivity_ms: profile.inactivity_ms.unwrap_or(caller.inactivity_ms),
        max_total_ms: profile.max_total_ms.unwrap_or(caller.max_total_ms),
        tool_timeout_ms: profile.tool_timeout_ms.unwrap_or(caller.tool_timeout_ms),
    }
}

/// Pipeline and monitor tunables (§6 Configuration).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_rework_attempts: u32,
    pub stale_max_age_ms: u64,
    pub completed_retention_ms: u64,
    pub monitor_tick_ms: u64,
    pub watchdog: WatchdogConfig,
    /// §9 Open Question #2: whether a dispatch that exhausts rework
    /// attempts is also moved to `completed` (status `failed`) or left
    /// active with `status = stuck`. Default `false` matches §4.5.3 step 5
    /// ("otherwise leave active as stuck").
    pub complete_stuck_dispatches: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rework_attempts: DEFAULT_MAX_REWORK_ATTEMPTS,
            stale_max_age_ms: DEFAULT_STALE_MAX_AGE_MS,
            completed_retention_ms: DEFAULT_COMPLETED_RETENTION_MS,
            monitor_tick_ms: DEFAULT_MONITOR_TICK_MS,
            watchdog: WatchdogConfig::default(),
            complete_stuck_dispatches: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration for the current process, matching the teacher's
    /// `Config::load()` entry point — there's no daemon state directory to
    /// resolve here, so this is just `from_env()` under the name callers
    /// reach for first.
    pub fn load() -> Self {
        Self::from_env()
    }

    /// Tier 3 of §4.3's resolution order with an environment layer, the way
    /// `env::drain_timeout()`/`env::ipc_timeout()` read theirs in the
    /// teacher: each var is parsed and silently dropped back to the
    /// hardcoded default on anything unset or unparseable.
    pub fn from_env() -> Self {
        Self {
            max_rework_attempts: env_u32("DISPATCH_MAX_REWORK_ATTEMPTS", DEFAULT_MAX_REWORK_ATTEMPTS),
            stale_max_age_ms: env_u64("DISPATCH_STALE_MAX_AGE_MS", DEFAULT_STALE_MAX_AGE_MS),
            completed_retention_ms: env_u64("DISPATCH_COMPLETED_RETENTION_MS", DEFAULT_COMPLETED_RETENTION_MS),
            monitor_tick_ms: env_u64("DISPATCH_MONITOR_TICK_MS", DEFAULT_MONITOR_TICK_MS),
            watchdog: WatchdogConfig::from_env(),
            complete_stuck_dispatches: env_bool("DISPATCH_COMPLETE_STUCK_DISPATCHES", false),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Locked store location (§4.1). No `Default`: resolving `<user
/// home>/.openclaw/linear-dispatch-state.json` needs `dirs::home_dir()`,
/// which lives in `dispatch-storage` alongside the rest of the filesystem
/// concerns (see `LockedStore::open_default`).
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub state_path: PathBuf,
}

impl StoreConfig {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }
}
