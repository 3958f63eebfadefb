//! Bounded reconnect policy.
//!
//! Fixed (non-exponential) backoff: every abnormal close schedules one retry
//! `interval` later until `max_attempts` retries have been spent.

use std::time::Duration;

use crate::time::Instant;

/// Maximum automatic reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay before each reconnect attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Reconnect configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Attempts allowed before the connection is declared lost
    pub max_attempts: u32,
    /// Delay before each attempt
    pub interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, interval: DEFAULT_RECONNECT_INTERVAL }
    }
}

/// Outcome of reporting an abnormal close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision<I> {
    /// A retry is scheduled
    Retry {
        /// 1-based attempt number
        attempt: u32,
        /// When the retry becomes due
        at: I,
    },
    /// Budget spent, no further automatic attempts
    Exhausted {
        /// Attempts that were made
        attempts: u32,
    },
}

/// Attempt counter plus at most one pending retry deadline.
///
/// # Invariants
///
/// - `attempts() <= max_attempts` at all times.
/// - At most one retry is pending.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy<I> {
    config: ReconnectConfig,
    attempts: u32,
    pending: Option<I>,
}

impl<I: Instant> ReconnectPolicy<I> {
    /// Create a policy with no attempts spent.
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempts: 0, pending: None }
    }

    /// Attempts spent since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a retry is waiting for its deadline.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Deadline of the pending retry.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        self.pending
    }

    /// Delay between attempts.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Record an abnormal close and decide what happens next.
    ///
    /// A close reported while a retry is already pending does not spend
    /// another attempt; the existing schedule is returned.
    pub fn on_abnormal_close(&mut self, now: I) -> ReconnectDecision<I> {
        if let Some(at) = self.pending {
            return ReconnectDecision::Retry { attempt: self.attempts, at };
        }

        if self.attempts >= self.config.max_attempts {
            return ReconnectDecision::Exhausted { attempts: self.attempts };
        }

        self.attempts += 1;
        let at = now + self.config.interval;
        self.pending = Some(at);
        ReconnectDecision::Retry { attempt: self.attempts, at }
    }

    /// Returns true once when the pending retry becomes due.
    pub fn poll(&mut self, now: I) -> bool {
        match self.pending {
            Some(at) if now >= at => {
                self.pending = None;
                true
            },
            _ => false,
        }
    }

    /// Forget all attempts. Called after a successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.pending = None;
    }
}
