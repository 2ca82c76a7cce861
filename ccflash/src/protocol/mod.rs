//! CC2538 serial bootloader protocol.

pub mod chunk;
pub mod frame;
pub mod response;

// Re-export common types
pub use chunk::ChunkCursor;
pub use frame::{Command, CommandFrame, MAX_PACKET_PAYLOAD, SYNC_BYTE, checksum};
pub use response::{ACK, ACK_PREFIX, Response, classify};
