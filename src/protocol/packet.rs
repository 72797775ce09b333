//! Outbound packet construction and header accessors

use bytes::{BufMut, Bytes, BytesMut};

use super::{HEAD_LENGTH, ID_OFFSET, LENGTH_OFFSET, MAGIC_BYTES, PROTOCOL_VERSION};

/// A single protocol message: routing ids plus an opaque body.
///
/// The body is raw bytes; any application-level serialization happens
/// before a `Packet` is built.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// Message id, used by receivers to route the body to a handler
    pub id: i32,
    /// Player/user id carried in the header
    pub player_id: i32,
    /// Server/route id carried in the header
    pub server_id: i32,
    /// Opaque message body
    pub body: Bytes,
}

impl Packet {
    /// Create a packet with routing ids left at zero
    pub fn new(id: i32, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            player_id: 0,
            server_id: 0,
            body: body.into(),
        }
    }

    /// Set the player id
    pub fn with_player_id(mut self, player_id: i32) -> Self {
        self.player_id = player_id;
        self
    }

    /// Set the server id
    pub fn with_server_id(mut self, server_id: i32) -> Self {
        self.server_id = server_id;
        self
    }

    /// Total on-wire length of this packet (header + body)
    pub fn wire_len(&self) -> usize {
        HEAD_LENGTH + self.body.len()
    }

    /// Encode into a complete wire frame: 19-byte header followed by the body.
    ///
    /// The version field occupies a single byte; the length field that
    /// follows it owns the rest of the 4-byte budget.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_slice(&MAGIC_BYTES);
        buf.put_u8(PROTOCOL_VERSION as u8);
        buf.put_i32_le(self.wire_len() as i32);
        buf.put_i32_le(self.id);
        buf.put_i32_le(self.player_id);
        buf.put_i32_le(self.server_id);
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

/// Check that a buffer is a plausible frame header: exactly 19 bytes long
/// and starting with the two magic bytes.
///
/// This is the sole framing-integrity check; version and length
/// consistency are not inspected here. A failure means the stream is
/// desynchronized and the connection cannot recover short of a fresh
/// connect.
pub fn validate_header(bytes: &[u8]) -> bool {
    bytes.len() == HEAD_LENGTH && bytes[0] == MAGIC_BYTES[0] && bytes[1] == MAGIC_BYTES[1]
}

/// Extract the message id and total frame length from a validated header.
///
/// Callers must have checked the header with [`validate_header`] first.
/// Body length is `total_len - HEAD_LENGTH`.
pub fn decode_header(head: &[u8]) -> (i32, i32) {
    let id = i32::from_le_bytes([
        head[ID_OFFSET],
        head[ID_OFFSET + 1],
        head[ID_OFFSET + 2],
        head[ID_OFFSET + 3],
    ]);
    let total_len = i32::from_le_bytes([
        head[LENGTH_OFFSET],
        head[LENGTH_OFFSET + 1],
        head[LENGTH_OFFSET + 2],
        head[LENGTH_OFFSET + 3],
    ]);
    (id, total_len)
}
