//! Keep-alive timer.
//!
//! Emits one probe per interval of connected time. A missing reply is not a
//! failure signal; dead connections are detected by the transport closing.

use std::time::Duration;

use crate::time::Instant;

/// Interval between keep-alive probes.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Keep-alive configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveConfig {
    /// Time between probes while connected
    pub interval: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_KEEPALIVE_INTERVAL }
    }
}

/// Periodic probe timer.
///
/// # Invariants
///
/// - At most one deadline is armed. [`KeepAlive::start`] while running
///   replaces it instead of adding a second one.
/// - A stopped timer never fires.
#[derive(Debug, Clone)]
pub struct KeepAlive<I> {
    interval: Duration,
    next_due: Option<I>,
}

impl<I: Instant> KeepAlive<I> {
    /// Create a stopped timer.
    pub fn new(config: KeepAliveConfig) -> Self {
        Self { interval: config.interval, next_due: None }
    }

    /// Arm the timer so the first probe is due one interval from `now`.
    pub fn start(&mut self, now: I) {
        self.next_due = Some(now + self.interval);
    }

    /// Disarm the timer.
    pub fn stop(&mut self) {
        self.next_due = None;
    }

    /// Whether a deadline is armed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Next probe deadline, if running.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        self.next_due
    }

    /// Returns true if a probe is due at `now`, and re-arms the timer.
    ///
    /// Fires at most once per call. If the caller fell more than one interval
    /// behind, the missed probes are skipped rather than sent in a burst.
    pub fn poll(&mut self, now: I) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }

        let mut next = due + self.interval;
        if next <= now {
            next = now + self.interval;
        }
        self.next_due = Some(next);
        true
    }
}
