//! CC2538 serial bootloader command frames.
//!
//! This module builds the byte frames understood by the ROM serial
//! bootloader (SBL) of CC2538-family chips.
//!
//! ## Frame Format
//!
//! All commands except `Sync` share the same layout:
//!
//! ```text
//! +--------+----------+--------+---------------+
//! | Length | Checksum | Opcode |     Data      |
//! +--------+----------+--------+---------------+
//! | 1 byte | 1 byte   | 1 byte |   variable    |
//! +--------+----------+--------+---------------+
//! | total  | sum(op..)| cmd    |   payload     |
//! +--------+----------+--------+---------------+
//! ```
//!
//! - `Length` counts every byte of the frame, itself included.
//! - `Checksum` is the 8-bit wrapping sum of opcode and payload bytes; the
//!   length byte is excluded.
//!
//! `Sync` is not a framed command at all: it is the raw two-byte handshake
//! pattern `[0x55, 0x55]` that the boot ROM uses for auto-baud detection.

use byteorder::{BigEndian, WriteBytesExt};

/// Auto-baud handshake byte, sent twice to synchronize with the boot ROM.
pub const SYNC_BYTE: u8 = 0x55;

/// Maximum payload of a single data packet.
///
/// 3 header bytes + 252 data bytes = 255, the ceiling imposed by the
/// one-byte length field.
pub const MAX_PACKET_PAYLOAD: usize = 252;

/// Bootloader command set.
///
/// The queue of a flash session is drawn from this closed set; exhaustive
/// matching at the encoder rules out ever emitting an undefined frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Auto-baud handshake (raw `[0x55, 0x55]`, no framing).
    Sync,
    /// Erase the full flash bank (0x2C).
    BankErase,
    /// Announce an incoming image and its length (0x21).
    Download,
    /// Transfer one chunk of image data (0x24).
    SendData,
    /// Reset the chip and leave the bootloader (0x25).
    Reset,
}

impl Command {
    /// Opcode byte for framed commands; `None` for the raw sync pattern.
    pub fn opcode(self) -> Option<u8> {
        match self {
            Self::Sync => None,
            Self::BankErase => Some(0x2C),
            Self::Download => Some(0x21),
            Self::SendData => Some(0x24),
            Self::Reset => Some(0x25),
        }
    }

    /// Human-readable name used in session logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::BankErase => "bankErase",
            Self::Download => "download",
            Self::SendData => "sendData",
            Self::Reset => "reset",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 8-bit wrapping sum over `bytes`.
///
/// The boot ROM compares only the low 8 bits of its own running sum, so the
/// value is masked by wrapping arithmetic here rather than left to grow.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Bootloader command frame builder.
#[derive(Debug)]
pub struct CommandFrame {
    cmd: Command,
    payload: Vec<u8>,
}

impl CommandFrame {
    /// Create an empty frame for the given command.
    fn new(cmd: Command) -> Self {
        Self {
            cmd,
            payload: Vec::new(),
        }
    }

    /// Build the auto-baud sync pattern.
    pub fn sync() -> Self {
        Self::new(Command::Sync)
    }

    /// Build a bank erase frame (`[0x03, 0x2C, 0x2C]`).
    pub fn bank_erase() -> Self {
        Self::new(Command::BankErase)
    }

    /// Build a download frame announcing `image_len` bytes.
    ///
    /// Payload: 4 reserved zero bytes followed by the big-endian image
    /// length, 11 frame bytes in total.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn download(image_len: u32) -> Self {
        let mut frame = Self::new(Command::Download);
        frame.payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        frame.payload.write_u32::<BigEndian>(image_len).unwrap();
        frame
    }

    /// Build a data frame carrying one image chunk.
    ///
    /// `chunk` must not exceed [`MAX_PACKET_PAYLOAD`]; an empty chunk is
    /// valid and produced for images whose length is an exact multiple of
    /// the packet payload.
    pub fn send_data(chunk: &[u8]) -> Self {
        debug_assert!(chunk.len() <= MAX_PACKET_PAYLOAD);
        let mut frame = Self::new(Command::SendData);
        frame.payload.extend_from_slice(chunk);
        frame
    }

    /// Build a reset frame (`[0x03, 0x25, 0x25]`).
    pub fn reset() -> Self {
        Self::new(Command::Reset)
    }

    /// Build the complete frame bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(&self) -> Vec<u8> {
        let Some(opcode) = self.cmd.opcode() else {
            return vec![SYNC_BYTE, SYNC_BYTE];
        };

        // Checksum covers opcode and payload, the length byte is excluded.
        let mut body = Vec::with_capacity(1 + self.payload.len());
        body.push(opcode);
        body.extend_from_slice(&self.payload);
        let sum = checksum(&body);

        // Safe cast: payload is bounded to MAX_PACKET_PAYLOAD upstream.
        let mut buf = Vec::with_capacity(2 + body.len());
        buf.push((body.len() + 2) as u8);
        buf.push(sum);
        buf.extend_from_slice(&body);
        buf
    }

    /// Get the command this frame encodes.
    pub fn command(&self) -> Command {
        self.cmd
    }
}
