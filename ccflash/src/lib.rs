//! # ccflash
//!
//! A library for flashing CC2538-family chips over the ROM serial
//! bootloader.
//!
//! This crate provides the core functionality for talking to the boot ROM
//! via serial port, including:
//!
//! - Intel HEX firmware image loading
//! - Bootloader command frame encoding with 8-bit checksums
//! - A lock-step flash session state machine with watchdog supervision
//! - Serial port abstraction and USB device discovery
//!
//! ## Example
//!
//! ```rust,no_run
//! use ccflash::{FirmwareImage, Flasher, SessionConfig, SessionEvent};
//!
//! fn main() -> ccflash::Result<()> {
//!     let image = FirmwareImage::from_hex_file("firmware.hex")?;
//!
//!     let config = SessionConfig::new("/dev/ttyUSB0", 115200);
//!     let mut flasher = Flasher::open(config)?;
//!
//!     flasher.flash(image, |event| match event {
//!         SessionEvent::Log(line) => eprintln!("{line}"),
//!         SessionEvent::Progress(percent) => eprintln!("{percent}%"),
//!         SessionEvent::Error(msg) | SessionEvent::Success(msg) => eprintln!("{msg}"),
//!     })?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod flasher;
pub mod image;
pub mod port;
pub mod protocol;
pub mod session;

// Re-exports for convenience
pub use {
    device::{DetectedPort, DeviceKind, auto_detect_port, detect_cc2538_ports, detect_ports},
    error::{Error, Result},
    flasher::Flasher,
    image::FirmwareImage,
    port::{NativePort, NativePortEnumerator, Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{ChunkCursor, Command, CommandFrame, MAX_PACKET_PAYLOAD, Response, classify},
    session::{
        DEFAULT_BAUD, DEFAULT_WATCHDOG_TIMEOUT, PROGRESS_PERIOD, SessionConfig, SessionEvent,
    },
};
