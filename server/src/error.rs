//! Error taxonomy for the server orchestrator.
//!
//! Only two kinds of failure are allowed to halt the process: configuration
//! errors and a database connection retry that has exhausted its attempt
//! ceiling. Everything else is contained at the component where it occurs —
//! admission rejections and debug-dump failures are console/log lines, and a
//! per-session update error never touches sibling sessions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid or missing startup configuration. Fatal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend or provider connectivity failure. Retried with a countdown up
    /// to the configured ceiling, then promoted to fatal.
    #[error("connection failed: {0}")]
    Transient(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure inside one session's tick work. Logged and isolated.
    #[error("session update failed for {identity}: {reason}")]
    SessionUpdate { identity: String, reason: String },

    /// Debug tooling failure. Always swallowed after logging.
    #[error("diagnostic failure: {0}")]
    Diagnostic(String),

    /// The scheduler's own bookkeeping broke. The only fatal tick error.
    #[error("tick counter overflow")]
    CounterOverflow,
}

impl ServerError {
    /// True for errors that abort startup or stop the run loop outright.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServerError::Config(_) | ServerError::CounterOverflow)
    }
}
