//! Length-prefixed binary framing with protocol ids.
//!
//! Every transport message carries exactly one frame:
//! - A 4-byte little-endian total length (header included)
//! - A 4-byte little-endian protocol id
//! - The opaque payload
//!
//! The transport below delivers whole messages, so decoding never buffers
//! partial frames.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{decode, decode_message, encode, encode_into, HEADER_SIZE, MAX_PAYLOAD};
pub use error::{FrameError, Result};
pub use message::Message;
