//! Per-connection traffic bookkeeping owned by one worker shard.

use bytes::BytesMut;

use crate::connection::Connection;
use crate::protocol::StreamReassembler;

/// A batch of encoded frames not yet fully handed to the transport.
#[derive(Debug, Default)]
pub struct PendingSend {
    buf: BytesMut,
    offset: usize,
}

impl PendingSend {
    /// Whether every queued byte has been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.buf.len()
    }

    /// Bytes still waiting to be written.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.offset..]
    }

    /// Start a new batch; the previous one must be finished.
    pub fn begin(&mut self) -> &mut BytesMut {
        debug_assert!(self.is_empty());
        self.buf.clear();
        self.offset = 0;
        &mut self.buf
    }

    pub fn advance(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.buf.len());
    }

    pub fn finish(&mut self) {
        self.offset = self.buf.len();
    }
}

/// Inbound reassembly state.
#[derive(Debug)]
pub struct RecvState {
    pub reassembler: StreamReassembler,
    /// A routing-id part arrived and its payload part has not.
    pub payload_pending: bool,
}

impl RecvState {
    #[must_use]
    pub fn new(packet_size: usize) -> Self {
        Self {
            reassembler: StreamReassembler::new(packet_size),
            payload_pending: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.payload_pending && !self.reassembler.has_partial()
    }
}

/// Everything a worker tracks for one connection.
#[derive(Debug)]
pub struct TrafficConnState {
    pub(crate) conn: Option<Connection>,
    /// Frames sent and not yet answered.
    pub pending: usize,
    pub out: PendingSend,
    pub rx: RecvState,
}

impl TrafficConnState {
    #[must_use]
    pub fn new(conn: Connection, packet_size: usize) -> Self {
        Self {
            conn: Some(conn),
            pending: 0,
            out: PendingSend::default(),
            rx: RecvState::new(packet_size),
        }
    }

    /// Nothing outstanding in either direction.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        match &self.conn {
            None => true,
            Some(conn) => {
                self.pending == 0
                    && self.out.is_empty()
                    && self.rx.is_idle()
                    && !conn.link().has_unflushed()
            }
        }
    }

    /// Drop the connection, returning how many frames were still pending.
    pub fn close(&mut self) -> usize {
        self.conn = None;
        self.out.finish();
        self.rx.reassembler.reset();
        self.rx.payload_pending = false;
        std::mem::take(&mut self.pending)
    }
}
