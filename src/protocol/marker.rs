//! Connection-lifecycle markers of the message framing.

/// Single-byte payload announcing a peer connect or disconnect.
///
/// Markers follow a routing-id part like any other message and are never
/// application traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleMarker {
    Disconnected,
    Connected,
}

impl LifecycleMarker {
    /// Recognize a marker payload.
    #[inline]
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            [0x01] => Some(LifecycleMarker::Connected),
            [0x00] => Some(LifecycleMarker::Disconnected),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            LifecycleMarker::Disconnected => 0x00,
            LifecycleMarker::Connected => 0x01,
        }
    }
}
