//! Wire encoding of message parts.
//!
//! A message is a sequence of parts; every part but the last has the
//! `more` flag set.
//!
//! ```text
//! +-------------+----------+-------------------+
//! | len u32 BE  | flags u8 | len bytes of data |
//! +-------------+----------+-------------------+
//!                 bit 0 = more parts follow
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Length plus flags.
pub const PART_HEADER: usize = 5;

/// Largest part accepted from a peer.
pub const MAX_PART_SIZE: usize = 64 * 1024 * 1024;

const FLAG_MORE: u8 = 0x01;
const RESERVED_FLAGS: u8 = !FLAG_MORE;

/// One decoded message part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub data: Bytes,
    /// More parts of the same message follow.
    pub more: bool,
}

impl Part {
    #[must_use]
    pub fn new(data: impl Into<Bytes>, more: bool) -> Self {
        Self {
            data: data.into(),
            more,
        }
    }
}

/// Bytes one part of `len` data bytes takes on the wire.
#[inline]
#[must_use]
pub const fn encoded_len(len: usize) -> usize {
    PART_HEADER + len
}

/// Append an encoded part to `dst`.
pub fn encode_part(dst: &mut BytesMut, data: &[u8], more: bool) {
    dst.reserve(encoded_len(data.len()));
    dst.put_u32(data.len() as u32);
    dst.put_u8(if more { FLAG_MORE } else { 0 });
    dst.extend_from_slice(data);
}

/// Split one complete part off the front of `src`.
///
/// Returns `Ok(None)` until a whole part is buffered.
pub fn decode_part(src: &mut BytesMut) -> Result<Option<Part>> {
    if src.len() < PART_HEADER {
        return Ok(None);
    }

    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    let flags = src[4];

    if flags & RESERVED_FLAGS != 0 {
        return Err(Error::ProtocolViolation(format!(
            "reserved part flags set: {flags:#04x}"
        )));
    }
    if len > MAX_PART_SIZE {
        return Err(Error::ProtocolViolation(format!(
            "part of {len} bytes exceeds limit of {MAX_PART_SIZE}"
        )));
    }
    if src.len() < PART_HEADER + len {
        src.reserve(PART_HEADER + len - src.len());
        return Ok(None);
    }

    src.advance(PART_HEADER);
    let data = src.split_to(len).freeze();
    Ok(Some(Part {
        data,
        more: flags & FLAG_MORE != 0,
    }))
}
