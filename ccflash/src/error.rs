//! Error types for ccflash.

use std::io;
use thiserror::Error;

/// Result type for ccflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ccflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on an open transport (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port open or configuration error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Firmware image could not be decoded.
    #[error("Invalid firmware image: {0}")]
    InvalidImage(String),

    /// The bootloader rejected a frame or sent an unexpected byte.
    #[error("Bootloader rejected frame: unexpected response byte {byte:#04x}")]
    Nack {
        /// The offending response byte.
        byte: u8,
    },

    /// No valid response arrived within the watchdog deadline.
    #[error("No response from bootloader within {ms} ms")]
    WatchdogTimeout {
        /// Configured deadline in milliseconds.
        ms: u64,
    },

    /// Command queue drained but the step count disagrees.
    ///
    /// This is a logic error in chunk/step bookkeeping, not a transient
    /// link fault.
    #[error("Step count mismatch: completed {completed} of {expected} steps")]
    StepMismatch {
        /// Steps acknowledged so far.
        completed: u32,
        /// Steps the session was expected to take.
        expected: u32,
    },

    /// The session was aborted by the user.
    #[error("Flashing aborted")]
    Aborted,

    /// No suitable serial port could be found.
    #[error("Device not found or not in bootloader mode")]
    DeviceNotFound,
}
