//! Console output with severity coloring, plus the countdown helper used
//! while retrying the database connection at startup.

use std::io::Write;
use std::time::Duration;

/// ANSI color used for error lines.
pub const COLOR_ERROR: u8 = 31;
/// ANSI color used for notices (shutdown phases, retries).
pub const COLOR_NOTICE: u8 = 33;

/// Banner printed once before anything else happens.
pub const GREETING: &str = "\
==========================================\n\
  game backend server\n\
  persistent session & scheduling core\n\
==========================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Notice,
    Error,
}

/// Writes formatted lines to stdout. Best effort: a failed write is dropped,
/// never retried, so diagnostics can never block the server.
#[derive(Debug, Clone)]
pub struct Console {
    default_color: u8,
}

impl Console {
    pub fn new(default_color: u8) -> Self {
        Self { default_color }
    }

    fn color_for(&self, severity: Severity) -> u8 {
        match severity {
            Severity::Info => self.default_color,
            Severity::Notice => COLOR_NOTICE,
            Severity::Error => COLOR_ERROR,
        }
    }

    pub fn format(&self, msg: &str, severity: Severity) -> String {
        format!(
            "[Console] \x1b[{};1m{}\x1b[0m\n",
            self.color_for(severity),
            msg
        )
    }

    pub fn print(&self, msg: &str, severity: Severity) {
        let line = self.format(msg, severity);
        let mut out = std::io::stdout();
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }
}

/// Re-displays `msg` with the remaining seconds once per second, returning
/// when the countdown reaches zero so the caller runs its action exactly once.
///
/// Used only during startup backend-connect retries, never inside the tick
/// scheduler.
pub async fn retry_with_countdown(console: &Console, msg: &str, seconds: u32) {
    let mut remaining = seconds;
    while remaining >= 1 {
        console.print(&format!("{}{}s", msg, remaining), Severity::Notice);
        tokio::time::sleep(Duration::from_secs(1)).await;
        remaining -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_colors() {
        let console = Console::new(37);
        assert!(console
            .format("hello", Severity::Info)
            .contains("\x1b[37;1m"));
        assert!(console
            .format("watch out", Severity::Notice)
            .contains("\x1b[33;1m"));
        assert!(console
            .format("broken", Severity::Error)
            .contains("\x1b[31;1m"));
    }

    #[test]
    fn test_format_shape() {
        let console = Console::new(37);
        let line = console.format("Server is full!", Severity::Error);
        assert!(line.starts_with("[Console] "));
        assert!(line.ends_with("\x1b[0m\n"));
        assert!(line.contains("Server is full!"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_completes() {
        let console = Console::new(37);
        retry_with_countdown(&console, "Retrying in ", 3).await;
        // Reaching here means the countdown terminated; the caller's action
        // runs exactly once after the await.
    }

    #[tokio::test]
    async fn test_zero_second_countdown_is_immediate() {
        let console = Console::new(37);
        retry_with_countdown(&console, "Retrying in ", 0).await;
    }
}
