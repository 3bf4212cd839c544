//! Frame codec: one message to and from its on-disk byte run.
//!
//! # Format
//!
//! Every frame is length-prefixed so a reader can skip forward in O(1)
//! and a recovery scan can spot a torn tail without delimiters:
//!
//! - Body length (4 bytes)
//! - Part count (4 bytes)
//! - Per part: length (4 bytes) + payload
//!
//! All integers are little-endian, fixed for the life of a directory.
//! The encoded size of a message, `8 + Σ(4 + part_len)`, is the unit the
//! backlog counter is measured in.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Message, Result};

/// Size of the whole-frame body length prefix.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Size of the part count field.
pub const COUNT_SIZE: usize = 4;

/// Size of a single part length header.
pub const PART_HEADER_SIZE: usize = 4;

/// Fixed overhead per frame: body length prefix + part count.
pub const FRAME_OVERHEAD: usize = LEN_PREFIX_SIZE + COUNT_SIZE;

/// Outcome of decoding the byte run starting at a frame boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame, and the number of bytes it occupied.
    Frame {
        /// The decoded message.
        message: Message,
        /// Total frame length including the body length prefix.
        frame_len: usize,
    },
    /// The buffer ends before a complete frame; no bytes consumed.
    Incomplete,
}

/// Number of bytes `encode` will produce for this message.
pub fn encoded_len(msg: &Message) -> usize {
    FRAME_OVERHEAD
        + msg
            .parts
            .iter()
            .map(|p| PART_HEADER_SIZE + p.len())
            .sum::<usize>()
}

/// Encode a message into a complete frame.
pub fn encode(msg: &Message) -> BytesMut {
    let total = encoded_len(msg);
    let mut buf = BytesMut::with_capacity(total);

    buf.put_u32_le((total - LEN_PREFIX_SIZE) as u32);
    buf.put_u32_le(msg.parts.len() as u32);
    for part in &msg.parts {
        debug_assert!(part.len() < (1 << 31)); // part length fits in an i32
        buf.put_u32_le(part.len() as u32);
        buf.put_slice(part);
    }

    debug_assert_eq!(buf.len(), total);
    buf
}

/// Decode the frame starting at `buf[0]`.
///
/// Returns [`Decoded::Incomplete`] when the buffer ends before a complete
/// frame, and [`Error::Corruption`] when the lengths inside a complete
/// body are inconsistent with it.
pub fn decode(buf: &[u8]) -> Result<Decoded> {
    if buf.len() < LEN_PREFIX_SIZE {
        return Ok(Decoded::Incomplete);
    }

    let body_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() - LEN_PREFIX_SIZE < body_len {
        return Ok(Decoded::Incomplete);
    }

    let body = &buf[LEN_PREFIX_SIZE..LEN_PREFIX_SIZE + body_len];
    let message = decode_body(body)?;

    Ok(Decoded::Frame {
        message,
        frame_len: LEN_PREFIX_SIZE + body_len,
    })
}

/// Decode an exact frame body (everything after the length prefix).
pub fn decode_body(body: &[u8]) -> Result<Message> {
    let mut buf = body;

    if buf.len() < COUNT_SIZE {
        return Err(Error::corruption("frame body shorter than part count"));
    }
    let count = buf.get_u32_le() as usize;

    // Each part needs at least its length header.
    if count > buf.len() / PART_HEADER_SIZE {
        return Err(Error::corruption("part count overflows frame body"));
    }

    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.len() < PART_HEADER_SIZE {
            return Err(Error::corruption("truncated part header"));
        }
        let len = buf.get_u32_le() as usize;
        if len > buf.len() {
            return Err(Error::corruption("part length overflows frame body"));
        }
        parts.push(Bytes::copy_from_slice(&buf[..len]));
        buf.advance(len);
    }

    if !buf.is_empty() {
        return Err(Error::corruption("trailing bytes in frame body"));
    }

    Ok(Message::from_parts(parts))
}
