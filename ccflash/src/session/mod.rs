//! Flash session orchestration.
//!
//! A session is split into a pure state machine ([`engine::Engine`]) and the
//! driver that runs it against a real transport
//! ([`crate::flasher::Flasher`]). The pieces here are deliberately free of
//! I/O: step accounting, the watchdog deadline and the event/action types.

pub mod engine;
pub mod progress;
pub mod watchdog;

use std::time::Duration;

pub use engine::{Action, Engine, Event, Outcome, SessionState};
pub use progress::SessionProgress;
pub use watchdog::{DEFAULT_WATCHDOG_TIMEOUT, Watchdog};

/// Baud rate the boot ROM starts at.
pub const DEFAULT_BAUD: u32 = 115200;

/// Cadence at which progress is sampled and reported.
pub const PROGRESS_PERIOD: Duration = Duration::from_millis(500);

/// Parameters for one flash session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Serial device to open (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate for the open call.
    pub baud_rate: u32,
    /// Time the bootloader gets to acknowledge each frame.
    pub watchdog_timeout: Duration,
    /// Cadence of progress notifications.
    pub progress_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            progress_period: PROGRESS_PERIOD,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the watchdog timeout.
    #[must_use]
    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    /// Set the progress notification cadence.
    #[must_use]
    pub fn with_progress_period(mut self, period: Duration) -> Self {
        self.progress_period = period;
        self
    }
}

/// Typed notifications emitted over a session's lifetime.
///
/// This stream is the entire observable surface for a host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Free-form log line.
    Log(String),
    /// Completion percentage in `[0, 100]`.
    Progress(u8),
    /// The session failed with a human-readable reason.
    Error(String),
    /// The session completed successfully.
    Success(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD);
        assert_eq!(config.watchdog_timeout, Duration::from_millis(2000));
        assert_eq!(config.progress_period, Duration::from_millis(500));
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::new("/dev/ttyUSB0", 460800)
            .with_watchdog_timeout(Duration::from_millis(500))
            .with_progress_period(Duration::from_millis(100));
        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 460800);
        assert_eq!(config.watchdog_timeout, Duration::from_millis(500));
        assert_eq!(config.progress_period, Duration::from_millis(100));
    }
}
