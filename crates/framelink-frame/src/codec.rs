use bytes::{Buf, BufMut, Bytes, BytesMut};
use framelink_transport::{MessageType, RawMessage};

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Frame header: total length (4) + protocol id (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Largest payload the 32-bit total length field can describe.
pub const MAX_PAYLOAD: usize = u32::MAX as usize - HEADER_SIZE;

/// Encode a frame into a freshly allocated buffer.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────┬─────────────────────────┐
/// │ Total length     │ Protocol id      │ Payload                 │
/// │ (4B LE)          │ (4B LE)          │ (total length - 8 B)    │
/// └──────────────────┴──────────────────┴─────────────────────────┘
/// ```
pub fn encode(protocol_id: u32, payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_into(protocol_id, payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Append an encoded frame to `dst`.
pub fn encode_into(protocol_id: u32, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le((HEADER_SIZE + payload.len()) as u32);
    dst.put_u32_le(protocol_id);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one complete frame into `(protocol_id, payload)`.
///
/// The input must be exactly one frame: the declared total length has to
/// equal `raw.len()`.
pub fn decode(raw: &[u8]) -> Result<(u32, Bytes)> {
    if raw.len() < HEADER_SIZE {
        return Err(FrameError::Truncated { len: raw.len() });
    }

    let mut header = &raw[..HEADER_SIZE];
    let declared = header.get_u32_le();
    let protocol_id = header.get_u32_le();

    if declared as usize != raw.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: raw.len(),
        });
    }

    Ok((protocol_id, Bytes::copy_from_slice(&raw[HEADER_SIZE..])))
}

/// Decode a transport message into a [`Message`].
///
/// Only binary transport messages carry frames. The payload shares the
/// transport buffer instead of copying it.
pub fn decode_message(raw: RawMessage) -> Result<Message> {
    if raw.kind != MessageType::Binary {
        return Err(FrameError::UnexpectedType(raw.kind));
    }

    let mut data = raw.data;
    if data.len() < HEADER_SIZE {
        return Err(FrameError::Truncated { len: data.len() });
    }

    let actual = data.len();
    let declared = data.get_u32_le();
    let protocol_id = data.get_u32_le();

    if declared as usize != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }

    Ok(Message::new(MessageType::Binary, protocol_id, data))
}
