//! Read-only startup configuration.
//!
//! Built once from command-line arguments in `main`, validated, then passed
//! down by value. Nothing re-reads configuration at runtime.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ServerError;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    /// Scheduler frequency in ticks per second.
    pub tick_rate: u32,

    /// Persistence backend identifier, matched case-insensitively.
    pub database_backend: String,
    pub database_url: String,

    pub download_provider: String,
    pub download_username: String,
    pub download_password: String,

    pub debug_dump_path: PathBuf,
    pub default_console_color: u8,

    pub save_interval_ticks: u64,
    pub timeout_interval_ticks: u64,
    pub full_update_interval_ticks: u64,
    pub session_idle_timeout_secs: u64,

    pub connect_retry_limit: u32,
    pub connect_retry_delay_secs: u32,
    pub shutdown_drain_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_connections: shared::DEFAULT_MAX_CONNECTIONS,
            tick_rate: shared::DEFAULT_TICK_RATE,
            database_backend: "mongo".to_string(),
            database_url: "mongodb://localhost:27017/game".to_string(),
            download_provider: "google".to_string(),
            download_username: String::new(),
            download_password: String::new(),
            debug_dump_path: PathBuf::from("dumps"),
            default_console_color: 37,
            save_interval_ticks: shared::SAVE_INTERVAL_TICKS,
            timeout_interval_ticks: shared::TIMEOUT_INTERVAL_TICKS,
            full_update_interval_ticks: shared::FULL_UPDATE_INTERVAL_TICKS,
            session_idle_timeout_secs: shared::SESSION_IDLE_TIMEOUT_SECS,
            connect_retry_limit: shared::CONNECT_RETRY_LIMIT,
            connect_retry_delay_secs: shared::CONNECT_RETRY_DELAY_SECS,
            shutdown_drain_ms: shared::SHUTDOWN_DRAIN_MS,
            shutdown_grace_ms: shared::SHUTDOWN_GRACE_MS,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_connections == 0 {
            return Err(ServerError::Config(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.tick_rate == 0 {
            return Err(ServerError::Config("tick_rate must be at least 1".into()));
        }
        if self.database_backend.trim().is_empty() {
            return Err(ServerError::Config("database backend not configured".into()));
        }
        if self.database_url.trim().is_empty() {
            return Err(ServerError::Config("database url not configured".into()));
        }
        if self.save_interval_ticks == 0
            || self.timeout_interval_ticks == 0
            || self.full_update_interval_ticks == 0
        {
            return Err(ServerError::Config(
                "tick interval thresholds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }
}
