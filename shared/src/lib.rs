use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default scheduler frequency in ticks per second.
pub const DEFAULT_TICK_RATE: u32 = 20;
/// Default hard cap on simultaneously connected clients.
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Ticks between full per-session update passes.
pub const FULL_UPDATE_INTERVAL_TICKS: u64 = 5;
/// Ticks between persistence flushes.
pub const SAVE_INTERVAL_TICKS: u64 = 150;
/// Ticks between idle-session sweeps.
pub const TIMEOUT_INTERVAL_TICKS: u64 = 50;
/// Seconds a session may sit idle before the sweep evicts it.
pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 60;

/// Maximum attempts to establish the database connection at startup.
pub const CONNECT_RETRY_LIMIT: u32 = 5;
/// Countdown length between database connection attempts.
pub const CONNECT_RETRY_DELAY_SECS: u32 = 5;
/// Window after listener close in which admitted exchanges may still finish
/// buffering and be dispatched.
pub const SHUTDOWN_DRAIN_MS: u64 = 1000;
/// Pause between the final shutdown phase and process exit.
pub const SHUTDOWN_GRACE_MS: u64 = 2000;

/// Current timestamp in milliseconds since the UNIX epoch.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// The orchestrator's handle on a player entity.
///
/// The game layer owns everything interesting about a player; the server core
/// only tracks the association between a connection identity and the player it
/// created, plus the bookkeeping the registry and the persistence flush need.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: u32,
    /// Connection identity that created this player.
    pub identity: String,
    pub created_at_ms: u64,
    pub last_active_ms: u64,
    /// Set whenever the player changed since the last persistence flush.
    pub dirty: bool,
}

impl Player {
    pub fn new(id: u32, identity: &str) -> Self {
        let now = timestamp_ms();
        Self {
            id,
            identity: identity.to_string(),
            created_at_ms: now,
            last_active_ms: now,
            dirty: true,
        }
    }

    /// Records activity, which also queues the player for the next flush.
    pub fn touch(&mut self) {
        self.last_active_ms = timestamp_ms();
        self.dirty = true;
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_active_ms)
    }
}

/// Result of a successful asset-provider login.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Asset {
    pub digest: String,
    pub version: u64,
}

impl Asset {
    /// A login that comes back without a digest is useless to the server.
    pub fn is_valid(&self) -> bool {
        !self.digest.is_empty()
    }
}

/// Download locations resolved for a batch of asset ids.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct DownloadUrls {
    pub urls: Vec<String>,
}
