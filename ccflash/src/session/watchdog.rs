//! Restartable deadline timer guarding the response stream.

use std::time::{Duration, Instant};

/// Default time the bootloader gets to acknowledge a frame.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_millis(2000);

/// A single restartable deadline.
///
/// The watchdog holds a deadline rather than running its own timer thread;
/// the session driver checks [`Watchdog::expired`] against the clock it
/// already uses to bound its blocking reads. Expiry checks take the current
/// `Instant` as a parameter so the timer is testable without sleeping.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Watchdog {
    /// Create a disarmed watchdog with the given timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Start the deadline from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    /// Cancel the deadline.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Cancel and start a fresh deadline from `now`.
    pub fn restart(&mut self, now: Instant) {
        self.disarm();
        self.arm(now);
    }

    /// True while a deadline is pending.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// True once the armed deadline has passed.
    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Time left until expiry, if armed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
