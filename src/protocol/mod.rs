//! Protocol module - Defines the wire format for framed connections
//!
//! Every frame is a fixed 19-byte header followed by a variable body:
//! - 2 magic bytes (8, 8)
//! - 1 byte protocol version
//! - 4 bytes total length, header + body (little-endian)
//! - 4 bytes message id (little-endian)
//! - 4 bytes player id (little-endian)
//! - 4 bytes server id (little-endian)
//! - Variable length body

mod packet;
mod codec;

pub use packet::*;
pub use codec::*;

/// Protocol version. The wire header only carries the low byte of this
/// 4-byte field; the remaining bytes are occupied by the length field.
pub const PROTOCOL_VERSION: u32 = 1;

/// Magic bytes marking the start of every frame header
pub const MAGIC_BYTES: [u8; 2] = [8, 8];

/// Fixed header length in bytes
pub const HEAD_LENGTH: usize = 19;

/// Byte offsets within the header
pub const VERSION_OFFSET: usize = 2;
pub const LENGTH_OFFSET: usize = 3;
pub const ID_OFFSET: usize = 7;
pub const PLAYER_ID_OFFSET: usize = 11;
pub const SERVER_ID_OFFSET: usize = 15;
pub const BODY_OFFSET: usize = 19;
