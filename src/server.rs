//! Echo server.
//!
//! Accepts connections and writes every received byte back unchanged. In
//! message framing each accepted peer gets a routing id, is greeted with a
//! connection-established marker, and every `[id][payload]` message is
//! answered with the same two parts.
//!
//! With echo disabled the server still accepts and reads, but never
//! answers. The runner uses this for the connection-only scenario.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::Interest;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::classify::{self, ErrorClassifier};
use crate::config::{BenchConfig, Framing, SocketOptions};
use crate::connection::MessageLink;
use crate::error::{Error, Result};
use crate::protocol::LifecycleMarker;

const READ_BUFFER: usize = 64 * 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(1);

/// Echo bytes a session may hold back before it is dropped.
pub const SESSION_SEND_LIMIT: usize = 1024 * 1024;

/// Counters kept by a running server.
#[derive(Debug, Default)]
pub struct ServerStats {
    accepted: AtomicU64,
    echoed_bytes: AtomicU64,
}

impl ServerStats {
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn echoed_bytes(&self) -> u64 {
        self.echoed_bytes.load(Ordering::Relaxed)
    }
}

/// A bound, running echo server.
#[derive(Debug)]
pub struct EchoServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    acceptor: JoinHandle<()>,
    stats: Arc<ServerStats>,
}

impl EchoServer {
    /// Bind to the configured endpoint and start accepting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the listener cannot be set up; the error
    /// is also recorded in `errors`.
    pub async fn bind(
        config: &BenchConfig,
        echo: bool,
        errors: Arc<ErrorClassifier>,
    ) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let listener = match listen(endpoint, &config.socket, &errors) {
            Ok(listener) => listener,
            Err(err) => {
                let code = classify::code_of(&err);
                if let Some(code) = code {
                    errors.record(code);
                }
                return Err(Error::Bind {
                    addr: endpoint.to_string(),
                    reason: err.to_string(),
                    code,
                });
            }
        };
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ServerStats::default());

        let acceptor = tokio::spawn(accept_loop(
            listener,
            Session {
                framing: config.framing,
                echo,
                no_delay: config.socket.no_delay,
                errors,
                stats: stats.clone(),
                next_id: Arc::new(AtomicU32::new(1)),
            },
            shutdown_rx,
        ));

        tracing::info!(%local_addr, framing = %config.framing, echo, "echo server listening");
        Ok(Self {
            local_addr,
            shutdown,
            acceptor,
            stats,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Stop accepting, close every session and wait for the acceptor.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.acceptor.await {
            tracing::warn!(error = %err, "acceptor task failed");
        }
        tracing::info!(
            accepted = self.stats.accepted(),
            echoed_bytes = self.stats.echoed_bytes(),
            "echo server stopped"
        );
    }
}

/// Buffer options that cannot be applied are recorded and skipped.
fn listen(
    endpoint: SocketAddr,
    options: &SocketOptions,
    errors: &ErrorClassifier,
) -> io::Result<TcpListener> {
    let socket = if endpoint.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    if options.sndbuf > 0 {
        errors.record_option("sndbuf", socket.set_send_buffer_size(options.sndbuf));
    }
    if options.rcvbuf > 0 {
        errors.record_option("rcvbuf", socket.set_recv_buffer_size(options.rcvbuf));
    }
    socket.bind(endpoint)?;
    socket.listen(options.backlog.max(1))
}

/// Per-session settings shared by every accepted connection.
#[derive(Clone)]
struct Session {
    framing: Framing,
    echo: bool,
    no_delay: bool,
    errors: Arc<ErrorClassifier>,
    stats: Arc<ServerStats>,
    next_id: Arc<AtomicU32>,
}

impl Session {
    fn record(&self, err: &io::Error) {
        if !classify::is_benign_disconnect(err) {
            self.errors.record_io(err);
        }
    }

    fn routing_id(&self) -> Bytes {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut id = BytesMut::with_capacity(5);
        id.put_u8(0);
        id.put_u32(n);
        id.freeze()
    }

    async fn serve(self, stream: TcpStream) {
        self.errors.record_option("nodelay", stream.set_nodelay(self.no_delay));
        let result = match self.framing {
            Framing::Stream => self.serve_stream(stream).await,
            Framing::Message => self.serve_message(stream).await,
        };
        if let Err(err) = result {
            self.record(&err);
        }
    }

    async fn serve_stream(&self, stream: TcpStream) -> io::Result<()> {
        let mut buf = vec![0u8; READ_BUFFER];
        let mut outbound = BytesMut::new();
        loop {
            let ready = stream.ready(interest(!outbound.is_empty())).await?;

            if ready.is_writable() {
                write_some(&stream, &mut outbound)?;
            }

            if ready.is_readable() {
                loop {
                    let n = match stream.try_read(&mut buf) {
                        Ok(0) => return Ok(()),
                        Ok(n) => n,
                        Err(e) if classify::is_retryable(&e) => break,
                        Err(e) => return Err(e),
                    };
                    if !self.echo {
                        continue;
                    }
                    if outbound.len() + n > SESSION_SEND_LIMIT {
                        self.overflow();
                        return Ok(());
                    }
                    outbound.extend_from_slice(&buf[..n]);
                    self.stats.echoed_bytes.fetch_add(n as u64, Ordering::Relaxed);
                    write_some(&stream, &mut outbound)?;
                }
            }
        }
    }

    async fn serve_message(&self, stream: TcpStream) -> io::Result<()> {
        let mut link = MessageLink::new(stream).with_write_limit(SESSION_SEND_LIMIT);
        let id = self.routing_id();
        link.send_part(&id, true).await?;
        link.send_part(&[LifecycleMarker::Connected.as_byte()], false).await?;

        let mut peer: Option<Bytes> = None;
        loop {
            link.ready(interest(link.has_unflushed())).await?;
            link.try_flush()?;

            loop {
                let part = match link.try_recv_part() {
                    Ok(part) => part,
                    Err(e) if classify::is_retryable(&e) => break,
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(e) => return Err(e),
                };
                let Some(routing_id) = peer.take() else {
                    if part.more {
                        peer = Some(part.data);
                    }
                    continue;
                };
                if LifecycleMarker::parse(&part.data).is_some() || !self.echo {
                    continue;
                }
                match link.try_send_message(&routing_id, &part.data) {
                    Ok(()) => {
                        self.stats
                            .echoed_bytes
                            .fetch_add(part.data.len() as u64, Ordering::Relaxed);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        self.overflow();
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    fn overflow(&self) {
        tracing::warn!("session outbound queue full, closing");
        self.errors.record(classify::ENOBUFS);
    }
}

/// Write queued echo bytes until done or the socket is full.
fn write_some(stream: &TcpStream, outbound: &mut BytesMut) -> io::Result<()> {
    while !outbound.is_empty() {
        match stream.try_write(&outbound[..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => outbound.advance(n),
            Err(e) if classify::is_retryable(&e) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn interest(want_write: bool) -> Interest {
    if want_write {
        Interest::READABLE | Interest::WRITABLE
    } else {
        Interest::READABLE
    }
}

async fn accept_loop(listener: TcpListener, session: Session, mut shutdown: watch::Receiver<bool>) {
    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _peer)) => {
                    session.stats.accepted.fetch_add(1, Ordering::Relaxed);
                    sessions.spawn(session.clone().serve(stream));
                }
                Err(err) => {
                    session.record(&err);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }
    sessions.shutdown().await;
}
