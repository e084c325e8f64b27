//! Application frame layout.
//!
//! ```text
//! +----------------+-------+------------------+----------------------+
//! | body_size u32  | phase | send_ts_ns u64   | filler (0x33)        |
//! | big endian     | u8    | little endian    | up to body_size      |
//! +----------------+-------+------------------+----------------------+
//!  `LENGTH_PREFIX`  `<------------------ body_size ------------------>`
//! ```
//!
//! The echo server never looks inside a frame; only the client that built
//! it decodes the reply, so the timestamp is always compared against the
//! same clock that produced it.

use bytes::{BufMut, Bytes, BytesMut};

/// Bytes taken by the big-endian body length.
pub const LENGTH_PREFIX: usize = 4;

/// Phase tag plus send timestamp.
pub const MIN_BODY_SIZE: usize = 9;

/// Byte used to pad a body to its configured size.
pub const FILLER_BYTE: u8 = 0x33;

const PHASE_OFFSET: usize = LENGTH_PREFIX;
const TIMESTAMP_OFFSET: usize = LENGTH_PREFIX + 1;
const HEADER_END: usize = TIMESTAMP_OFFSET + 8;

/// Traffic classification carried inside every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Phase {
    /// Warm-up traffic, never counted.
    #[default]
    Warmup = 0,
    /// Measured traffic.
    Measured = 1,
}

impl Phase {
    /// Decode a phase tag. Anything other than 1 is warm-up.
    #[inline]
    #[must_use]
    pub const fn from_tag(tag: u8) -> Self {
        if tag == Phase::Measured as u8 {
            Phase::Measured
        } else {
            Phase::Warmup
        }
    }

    #[inline]
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn is_measured(self) -> bool {
        matches!(self, Phase::Measured)
    }
}

/// Decoded header of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppFrame {
    pub phase: Phase,
    /// Sender's timestamp, 0 if none was taken.
    pub sent_ns: u64,
}

/// Fixed frame geometry for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    body_size: usize,
}

impl FrameLayout {
    /// Layout for a requested body size, raised to [`MIN_BODY_SIZE`].
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            body_size: size.max(MIN_BODY_SIZE),
        }
    }

    #[inline]
    #[must_use]
    pub const fn body_size(&self) -> usize {
        self.body_size
    }

    /// Bytes one frame occupies, length prefix included.
    #[inline]
    #[must_use]
    pub const fn packet_size(&self) -> usize {
        LENGTH_PREFIX + self.body_size
    }

    /// A frame with a zeroed header and filler body.
    ///
    /// Batches are built by copying this and patching the header.
    #[must_use]
    pub fn template(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.packet_size());
        buf.put_u32(self.body_size as u32);
        buf.put_u8(Phase::Warmup.tag());
        buf.put_u64_le(0);
        buf.resize(self.packet_size(), FILLER_BYTE);
        buf.freeze()
    }

    /// Append one frame built from `template` to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut, template: &[u8], phase: Phase, sent_ns: u64) {
        debug_assert_eq!(template.len(), self.packet_size());
        let start = dst.len();
        dst.extend_from_slice(template);
        Self::patch_header(&mut dst[start..], phase, sent_ns);
    }

    /// Overwrite the phase tag and timestamp of an encoded frame.
    pub fn patch_header(packet: &mut [u8], phase: Phase, sent_ns: u64) {
        packet[PHASE_OFFSET] = phase.tag();
        packet[TIMESTAMP_OFFSET..HEADER_END].copy_from_slice(&sent_ns.to_le_bytes());
    }

    /// Decode one whole frame.
    ///
    /// Returns `None` if the slice has the wrong length or the body-size
    /// field does not match this layout; such frames are dropped silently.
    #[must_use]
    pub fn decode(&self, packet: &[u8]) -> Option<AppFrame> {
        if packet.len() != self.packet_size() {
            return None;
        }
        let body = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]);
        if body as usize != self.body_size {
            return None;
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&packet[TIMESTAMP_OFFSET..HEADER_END]);
        Some(AppFrame {
            phase: Phase::from_tag(packet[PHASE_OFFSET]),
            sent_ns: u64::from_le_bytes(ts),
        })
    }
}
