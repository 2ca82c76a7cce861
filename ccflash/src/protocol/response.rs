//! Bootloader response classification.
//!
//! The boot ROM acknowledges every frame with the two-byte sequence
//! `[0x00, 0xCC]`. Depending on baud rate and host timing the serial layer
//! may deliver those bytes in a single notification or split across two, so
//! classification never assumes one delivery equals one logical response:
//! only the last byte of each received chunk is inspected, and a trailing
//! `0x00` means "keep waiting".

/// Acknowledge byte.
pub const ACK: u8 = 0xCC;

/// Leading byte of the two-byte acknowledge sequence.
pub const ACK_PREFIX: u8 = 0x00;

/// Classification of one received chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// The frame was acknowledged.
    Ack,
    /// More bytes are needed before the response is complete.
    ///
    /// A pending classification must not advance any session state and must
    /// not touch the watchdog.
    Pending,
    /// The device rejected the frame or sent something unexpected.
    Nack(u8),
}

/// Classify a received chunk by its last byte.
pub fn classify(data: &[u8]) -> Response {
    match data.last() {
        None | Some(&ACK_PREFIX) => Response::Pending,
        Some(&ACK) => Response::Ack,
        Some(&other) => Response::Nack(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_single_delivery_ack() {
        assert_eq!(classify(&[0x00, 0xCC]), Response::Ack);
    }

    #[test]
    fn test_classify_split_delivery_merges_to_ack() {
        // [0x00] then [0xCC] must behave exactly like [0x00, 0xCC] at once.
        assert_eq!(classify(&[0x00]), Response::Pending);
        assert_eq!(classify(&[0xCC]), Response::Ack);
    }

    #[test]
    fn test_classify_nack() {
        assert_eq!(classify(&[0x33]), Response::Nack(0x33));
        assert_eq!(classify(&[0x00, 0xCD]), Response::Nack(0xCD));
    }

    #[test]
    fn test_classify_empty_chunk_is_pending() {
        assert_eq!(classify(&[]), Response::Pending);
    }

    #[test]
    fn test_classify_only_last_byte_counts() {
        // Garbage before a final ACK byte is ignored.
        assert_eq!(classify(&[0x13, 0x37, 0xCC]), Response::Ack);
        // A final 0x00 keeps waiting even after a previous ACK byte.
        assert_eq!(classify(&[0xCC, 0x00]), Response::Pending);
    }
}
