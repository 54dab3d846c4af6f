//! Host-silence supervisor.

use crate::config::WATCHDOG_TIMEOUT_TICKS;

/// Result of advancing the watchdog by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// Nothing changed.
    Idle,
    /// The timeout was reached on this tick; the pipelines must be halted.
    Expired,
}

/// Counts ticks since the last qualifying host command.
///
/// Starts stopped: the pipelines are not clocked until the host pushes work
/// or sets a frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchdog {
    count: u16,
    timeout: u16,
    stopped: bool,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(WATCHDOG_TIMEOUT_TICKS)
    }
}

impl Watchdog {
    pub const fn new(timeout: u16) -> Self {
        Self {
            count: 0,
            timeout,
            stopped: true,
        }
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn timeout(&self) -> u16 {
        self.timeout
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Reset the tick counter.
    pub fn feed(&mut self) {
        self.count = 0;
    }

    /// Leave the stopped state. Returns whether it was stopped.
    pub fn resume(&mut self) -> bool {
        core::mem::replace(&mut self.stopped, false)
    }

    /// Force the stopped state without waiting for the timeout.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Advance by one tick. `Expired` is returned once per running period.
    pub fn tick(&mut self) -> WatchdogEvent {
        self.count = self.count.saturating_add(1);
        if !self.stopped && self.count >= self.timeout {
            self.stopped = true;
            WatchdogEvent::Expired
        } else {
            WatchdogEvent::Idle
        }
    }
}
