//! Non-blocking frame transfer over either framing.
//!
//! [`FrameCodec`] moves encoded batches out and hands whole application
//! frames in, hiding whether the link is a plain byte stream or carries
//! routing-id/payload messages.

pub mod part;

use std::io;

use crate::classify;
use crate::config::Framing;
use crate::connection::{Connection, Link, PendingSend, RecvState};
use crate::protocol::LifecycleMarker;

/// Receive operations attempted per connection per pass.
pub const RECV_BURST: usize = 16;

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Nothing was queued.
    Idle,
    /// The batch is fully handed to the transport.
    Done,
    /// The transport is full; retry on a later pass.
    Blocked { progressed: bool },
}

impl Flush {
    #[must_use]
    pub const fn progressed(&self) -> bool {
        matches!(self, Flush::Done | Flush::Blocked { progressed: true })
    }
}

/// Framing-specific transfer of application frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCodec {
    /// Frames written back to back; a read may hold any fragment.
    Stream,
    /// Each batch is one payload part behind the peer's routing id.
    Message,
}

impl FrameCodec {
    #[must_use]
    pub const fn for_framing(framing: Framing) -> Self {
        match framing {
            Framing::Stream => FrameCodec::Stream,
            Framing::Message => FrameCodec::Message,
        }
    }

    /// Push the queued batch towards the peer.
    pub fn flush(&self, conn: &mut Connection, out: &mut PendingSend) -> io::Result<Flush> {
        let peer_id = conn.peer_id().clone();
        match conn.link_mut() {
            Link::Stream(stream) => {
                if out.is_empty() {
                    return Ok(Flush::Idle);
                }
                let mut progressed = false;
                while !out.is_empty() {
                    match stream.try_write(out.remaining()) {
                        Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                        Ok(n) => {
                            out.advance(n);
                            progressed = true;
                        }
                        Err(e) if classify::is_retryable(&e) => {
                            return Ok(Flush::Blocked { progressed });
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(Flush::Done)
            }
            Link::Message(link) => {
                let drained = link.try_flush()?;
                if out.is_empty() {
                    return Ok(if drained {
                        Flush::Idle
                    } else {
                        Flush::Blocked { progressed: false }
                    });
                }
                match link.try_send_message(&peer_id, out.remaining()) {
                    Ok(()) => {
                        out.finish();
                        Ok(Flush::Done)
                    }
                    Err(e) if classify::is_retryable(&e) => {
                        Ok(Flush::Blocked { progressed: false })
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Read what is available and call `on_packet` for every whole frame.
    ///
    /// Returns whether anything was read. End of stream is reported as
    /// `UnexpectedEof`.
    pub fn receive<F>(
        &self,
        conn: &mut Connection,
        rx: &mut RecvState,
        scratch: &mut [u8],
        mut on_packet: F,
    ) -> io::Result<bool>
    where
        F: FnMut(&[u8]),
    {
        let mut progressed = false;
        match conn.link_mut() {
            Link::Stream(stream) => {
                for _ in 0..RECV_BURST {
                    match stream.try_read(scratch) {
                        Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                        Ok(n) => {
                            rx.reassembler.push(&scratch[..n], &mut on_packet);
                            progressed = true;
                        }
                        Err(e) if classify::is_retryable(&e) => break,
                        Err(e) => return Err(e),
                    }
                }
            }
            Link::Message(link) => {
                for _ in 0..RECV_BURST {
                    let part = match link.try_recv_part() {
                        Ok(part) => part,
                        Err(e) if classify::is_retryable(&e) => break,
                        Err(e) => return Err(e),
                    };
                    progressed = true;

                    if !rx.payload_pending {
                        // routing id; a lone part without `more` is not a message
                        rx.payload_pending = part.more;
                        continue;
                    }
                    rx.payload_pending = false;

                    if LifecycleMarker::parse(&part.data).is_some() {
                        continue;
                    }
                    rx.reassembler.push(&part.data, &mut on_packet);
                }
            }
        }
        Ok(progressed)
    }
}

impl From<Framing> for FrameCodec {
    fn from(framing: Framing) -> Self {
        FrameCodec::for_framing(framing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MessageLink;
    use crate::protocol::{FrameLayout, Phase};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), server.unwrap().0)
    }

    async fn flush_until_done(codec: FrameCodec, conn: &mut Connection, out: &mut PendingSend) {
        for _ in 0..1000 {
            let status = codec.flush(conn, out).unwrap();
            let unflushed = conn.link().has_unflushed();
            if matches!(status, Flush::Done | Flush::Idle) && !unflushed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("flush never completed");
    }

    async fn receive_frames(
        codec: FrameCodec,
        conn: &mut Connection,
        rx: &mut RecvState,
        layout: FrameLayout,
        want: usize,
    ) -> Vec<u64> {
        let mut scratch = vec![0u8; 4096];
        let mut seen = Vec::new();
        for _ in 0..1000 {
            codec
                .receive(conn, rx, &mut scratch, |p| {
                    seen.push(layout.decode(p).unwrap().sent_ns);
                })
                .unwrap();
            if seen.len() >= want {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        seen
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stream_echo_through_codec() {
        let (client, mut server) = pair().await;
        let layout = FrameLayout::new(16);
        let template = layout.template();

        let echo = tokio::spawn(async move {
            let mut buf = vec![0u8; 3 * layout.packet_size()];
            server.read_exact(&mut buf).await.unwrap();
            // dribble the reply back to force fragmented reads
            for chunk in buf.chunks(7) {
                server.write_all(chunk).await.unwrap();
                server.flush().await.unwrap();
            }
        });

        let codec = FrameCodec::Stream;
        let mut conn = Connection::stream(0, client);
        let mut out = PendingSend::default();
        let batch = out.begin();
        for ts in 1..=3 {
            layout.encode_into(batch, &template, Phase::Measured, ts);
        }
        flush_until_done(codec, &mut conn, &mut out).await;

        let mut rx = RecvState::new(layout.packet_size());
        let seen = receive_frames(codec, &mut conn, &mut rx, layout, 3).await;
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(rx.is_idle());
        echo.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_message_codec_skips_markers() {
        let (client, server) = pair().await;
        let layout = FrameLayout::new(9);
        let template = layout.template();

        let echo = tokio::spawn(async move {
            let mut link = MessageLink::new(server);
            let (id, payload) = link.recv_message().await.unwrap();
            link.send_part(&id, true).await.unwrap();
            link.send_part(&[0x01], false).await.unwrap();
            link.send_part(&id, true).await.unwrap();
            link.send_part(&payload, false).await.unwrap();
        });

        let codec = FrameCodec::Message;
        let mut conn = Connection::message(0, MessageLink::new(client), "rid".into());
        let mut out = PendingSend::default();
        let batch = out.begin();
        layout.encode_into(batch, &template, Phase::Measured, 10);
        layout.encode_into(batch, &template, Phase::Warmup, 20);
        flush_until_done(codec, &mut conn, &mut out).await;

        let mut rx = RecvState::new(layout.packet_size());
        let seen = receive_frames(codec, &mut conn, &mut rx, layout, 2).await;
        assert_eq!(seen, vec![10, 20]);
        echo.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_flush() {
        let (client, _server) = pair().await;
        let mut conn = Connection::stream(0, client);
        let mut out = PendingSend::default();
        assert_eq!(FrameCodec::Stream.flush(&mut conn, &mut out).unwrap(), Flush::Idle);
    }

    #[test]
    fn test_codec_from_framing() {
        assert_eq!(FrameCodec::from(Framing::Stream), FrameCodec::Stream);
        assert_eq!(FrameCodec::from(Framing::Message), FrameCodec::Message);
    }
}
