//! Tick counters and periodic-job bookkeeping.
//!
//! The counters are pure state: the run loop owns the actual interval timer
//! and calls [`TickCounters::advance`] once per firing, inline, so ticks can
//! never overlap and a late tick is deferred rather than dropped. `advance`
//! reports which periodic jobs came due this tick; fanning them out is the
//! lifecycle controller's job.

use crate::config::Config;
use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickThresholds {
    pub save: u64,
    pub timeout: u64,
    pub full: u64,
}

impl TickThresholds {
    pub fn from_config(config: &Config) -> Self {
        Self {
            save: config.save_interval_ticks,
            timeout: config.timeout_interval_ticks,
            full: config.full_update_interval_ticks,
        }
    }
}

/// Jobs that came due on a single tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickJobs {
    pub flush: bool,
    pub sweep: bool,
    pub full_update: bool,
}

/// The server's logical clock. Advanced only by the scheduler; ingress
/// handlers never touch these.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TickCounters {
    /// Ticks elapsed.
    pub tick: u64,
    /// Total ticks ever processed.
    pub passed_ticks: u64,
    /// Wall-clock seconds accumulated across ticks.
    pub time: f64,
    /// Ticks since the last full per-session update pass.
    pub full_tick: u64,
    /// Ticks since the last persistence flush.
    pub save_tick: u64,
    /// Ticks since the last idle sweep.
    pub timeout_tick: u64,
}

impl TickCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances every counter by one tick and accumulates `dt_secs` of wall
    /// time. Each periodic counter that reached its threshold is reset to
    /// zero and its job flagged, so a counter is never observed at or above
    /// its threshold after a firing.
    pub fn advance(
        &mut self,
        dt_secs: f64,
        thresholds: &TickThresholds,
    ) -> Result<TickJobs, ServerError> {
        self.tick = self.tick.checked_add(1).ok_or(ServerError::CounterOverflow)?;
        self.passed_ticks = self
            .passed_ticks
            .checked_add(1)
            .ok_or(ServerError::CounterOverflow)?;
        self.time += dt_secs;

        self.full_tick += 1;
        self.save_tick += 1;
        self.timeout_tick += 1;

        let mut jobs = TickJobs::default();
        if self.save_tick >= thresholds.save {
            self.save_tick = 0;
            jobs.flush = true;
        }
        if self.timeout_tick >= thresholds.timeout {
            self.timeout_tick = 0;
            jobs.sweep = true;
        }
        if self.full_tick >= thresholds.full {
            self.full_tick = 0;
            jobs.full_update = true;
        }

        Ok(jobs)
    }
}
