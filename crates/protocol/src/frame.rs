//! Length-prefixed framing.
//!
//! ```text
//! [4 bytes BE: payload_len][payload_len bytes: payload]
//! ```

use crate::codec;
use crate::error::ProtocolError;
use crate::message::Message;

/// Size of the length prefix in bytes.
pub const PREFIX_LEN: usize = 4;

/// Encodes a message as a complete frame: length prefix followed by payload.
///
/// Fails if the payload would exceed `max_frame_len`.
pub fn encode_frame(message: &Message, max_frame_len: usize) -> Result<Vec<u8>, ProtocolError> {
    let payload = codec::encode(message)?;
    let len = check_len(payload.len(), max_frame_len)?;

    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Parses a length prefix and validates it against `max_frame_len`.
pub fn parse_prefix(prefix: [u8; PREFIX_LEN], max_frame_len: usize) -> Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(prefix) as usize;
    check_len(len, max_frame_len)?;
    Ok(len)
}

fn check_len(len: usize, max_frame_len: usize) -> Result<u32, ProtocolError> {
    if len > max_frame_len {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: max_frame_len,
        });
    }
    u32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge {
        len,
        max: u32::MAX as usize,
    })
}
