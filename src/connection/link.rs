//! Client-side connection handles over TCP.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, Interest, Ready};
use tokio::net::TcpStream;

use crate::classify;
use crate::codec::part::{Part, decode_part, encode_part, encoded_len};
use crate::error::{Error, Result};
use crate::protocol::LifecycleMarker;

/// Queued outbound bytes above which new parts are refused.
pub const OUTBOUND_LIMIT: usize = 1024 * 1024;

/// Longest routing id accepted from a connection-established marker.
pub const MAX_ROUTING_ID: usize = 256;

const READ_CHUNK: usize = 64 * 1024;

fn invalid_data(err: Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

/// Message-oriented link: routing-id and payload parts over one stream.
///
/// Outbound parts go through a bounded buffer. A part is queued whole or
/// not at all, so a message is never interleaved with another.
#[derive(Debug)]
pub struct MessageLink {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    write_limit: usize,
}

impl MessageLink {
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
            write_limit: OUTBOUND_LIMIT,
        }
    }

    #[must_use]
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = limit.max(1);
        self
    }

    /// Whether queued outbound bytes remain.
    #[inline]
    #[must_use]
    pub fn has_unflushed(&self) -> bool {
        !self.write_buf.is_empty()
    }

    /// Whether `needed` more bytes may be queued. An empty buffer always
    /// takes one message, however large.
    fn has_room(&self, needed: usize) -> bool {
        self.write_buf.is_empty() || self.write_buf.len() + needed <= self.write_limit
    }

    /// Queue a routing-id part and its payload part as one message.
    ///
    /// Fails with `WouldBlock` if the outbound buffer would go over its
    /// limit; nothing is queued in that case.
    pub fn try_send_message(&mut self, id: &[u8], payload: &[u8]) -> io::Result<()> {
        self.try_flush()?;
        if !self.has_room(encoded_len(id.len()) + encoded_len(payload.len())) {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        encode_part(&mut self.write_buf, id, true);
        encode_part(&mut self.write_buf, payload, false);
        self.try_flush()?;
        Ok(())
    }

    /// Wait until the socket is ready for `interest`.
    pub async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        self.stream.ready(interest).await
    }

    /// Write as much queued data as the socket takes.
    ///
    /// Returns `true` once the outbound buffer is empty.
    pub fn try_flush(&mut self) -> io::Result<bool> {
        while !self.write_buf.is_empty() {
            match self.stream.try_write(&self.write_buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if classify::is_retryable(&e) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Receive one part without blocking.
    ///
    /// Fails with `WouldBlock` when no whole part is available yet.
    pub fn try_recv_part(&mut self) -> io::Result<Part> {
        loop {
            if let Some(part) = decode_part(&mut self.read_buf).map_err(invalid_data)? {
                return Ok(part);
            }
            self.read_buf.reserve(READ_CHUNK);
            match self.stream.try_read_buf(&mut self.read_buf) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Queue one part and wait until everything queued is written.
    pub async fn send_part(&mut self, data: &[u8], more: bool) -> io::Result<()> {
        encode_part(&mut self.write_buf, data, more);
        self.flush().await
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() {
            self.stream.write_all(&self.write_buf).await?;
            self.write_buf.clear();
        }
        Ok(())
    }

    /// Wait for the next whole part.
    pub async fn recv_part(&mut self) -> io::Result<Part> {
        loop {
            if let Some(part) = decode_part(&mut self.read_buf).map_err(invalid_data)? {
                return Ok(part);
            }
            self.read_buf.reserve(READ_CHUNK);
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
        }
    }

    /// Wait for the next routing-id and payload pair.
    pub async fn recv_message(&mut self) -> io::Result<(Bytes, Bytes)> {
        loop {
            let id = self.recv_part().await?;
            if !id.more {
                // stray single part, not addressed to anyone
                continue;
            }
            let payload = self.recv_part().await?;
            return Ok((id.data, payload.data));
        }
    }

    /// Wait for the connection-established marker and return the routing id
    /// it was addressed with.
    pub async fn await_connected(&mut self) -> Result<Bytes> {
        loop {
            let (id, payload) = self.recv_message().await?;
            if id.is_empty() || id.len() > MAX_ROUTING_ID {
                continue;
            }
            if LifecycleMarker::parse(&payload) == Some(LifecycleMarker::Connected) {
                return Ok(id);
            }
        }
    }
}

/// Transport carried by one client connection.
#[derive(Debug)]
pub enum Link {
    Stream(TcpStream),
    Message(MessageLink),
}

impl Link {
    #[must_use]
    pub fn has_unflushed(&self) -> bool {
        match self {
            Link::Stream(_) => false,
            Link::Message(link) => link.has_unflushed(),
        }
    }
}

/// One established client connection.
#[derive(Debug)]
pub struct Connection {
    index: usize,
    link: Link,
    /// Routing id to address the peer with; empty for byte streams.
    peer_id: Bytes,
}

impl Connection {
    #[must_use]
    pub fn stream(index: usize, stream: TcpStream) -> Self {
        Self {
            index,
            link: Link::Stream(stream),
            peer_id: Bytes::new(),
        }
    }

    #[must_use]
    pub fn message(index: usize, link: MessageLink, peer_id: Bytes) -> Self {
        Self {
            index,
            link: Link::Message(link),
            peer_id,
        }
    }

    /// Position of this connection in the pool's connect order.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn peer_id(&self) -> &Bytes {
        &self.peer_id
    }

    #[must_use]
    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }

    /// Send one packet and wait for its echo.
    pub async fn round_trip(&mut self, packet: &[u8]) -> Result<Bytes> {
        match &mut self.link {
            Link::Stream(stream) => {
                stream.write_all(packet).await?;
                let mut reply = vec![0u8; packet.len()];
                stream.read_exact(&mut reply).await?;
                Ok(Bytes::from(reply))
            }
            Link::Message(link) => {
                link.send_part(&self.peer_id, true).await?;
                link.send_part(packet, false).await?;
                let mut reply = BytesMut::with_capacity(packet.len());
                while reply.len() < packet.len() {
                    let (_, payload) = link.recv_message().await?;
                    if LifecycleMarker::parse(&payload).is_some() {
                        continue;
                    }
                    reply.extend_from_slice(&payload);
                }
                Ok(reply.freeze())
            }
        }
    }
}
