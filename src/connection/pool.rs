//! Bounded-concurrency connection establishment.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout_at;

use crate::classify::ErrorClassifier;
use crate::config::{BenchConfig, Framing, SocketOptions};
use crate::connection::{Connection, MessageLink};
use crate::error::{Error, Result};

/// Connections held open after the connect phase, plus its tallies.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    pub connections: Vec<Connection>,
    pub success: u64,
    pub fail: u64,
    pub timeout: u64,
    pub elapsed: Duration,
}

impl PoolOutcome {
    /// Every attempt succeeded.
    #[must_use]
    pub fn all_connected(&self, ccu: usize) -> bool {
        self.success == ccu as u64 && self.fail == 0 && self.timeout == 0
    }

    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.success + self.fail + self.timeout
    }
}

/// Opens `ccu` client connections to one endpoint.
///
/// At most `concurrency` attempts are in flight at once. Each attempt,
/// including the wait for the connection-established marker on message
/// links, is bounded by the connect timeout.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    ccu: usize,
    concurrency: usize,
    timeout: Duration,
    framing: Framing,
    socket: SocketOptions,
    errors: Arc<ErrorClassifier>,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(config: &BenchConfig, errors: Arc<ErrorClassifier>) -> Self {
        Self {
            ccu: config.ccu,
            concurrency: config.connect_concurrency.max(1),
            timeout: config.connect_timeout,
            framing: config.framing,
            socket: config.socket.clone(),
            errors,
        }
    }

    /// Attempt every connection and wait for all attempts to finish.
    ///
    /// Failures are counted and recorded, never returned.
    pub async fn establish(&self, endpoint: SocketAddr) -> PoolOutcome {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        let mut outcome = PoolOutcome {
            connections: Vec::with_capacity(self.ccu),
            ..PoolOutcome::default()
        };

        for index in 0..self.ccu {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let timeout = self.timeout;
            let framing = self.framing;
            let socket = self.socket.clone();
            let errors = self.errors.clone();

            set.spawn(async move {
                let deadline = Instant::now() + timeout;
                let result =
                    connect_one(index, endpoint, framing, &socket, &errors, deadline).await;
                drop(permit);
                result
            });

            // keep the join set from growing with finished attempts
            while let Some(joined) = set.try_join_next() {
                self.tally(joined, &mut outcome);
            }
        }

        while let Some(joined) = set.join_next().await {
            self.tally(joined, &mut outcome);
        }

        outcome.connections.sort_by_key(Connection::index);
        outcome.elapsed = started.elapsed();
        debug_assert_eq!(outcome.attempts(), self.ccu as u64);
        tracing::info!(
            attempts = outcome.attempts(),
            success = outcome.success,
            fail = outcome.fail,
            timeout = outcome.timeout,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "connect phase finished"
        );
        outcome
    }

    fn tally(
        &self,
        joined: std::result::Result<Result<Connection>, tokio::task::JoinError>,
        outcome: &mut PoolOutcome,
    ) {
        match joined {
            Ok(Ok(conn)) => {
                outcome.success += 1;
                outcome.connections.push(conn);
            }
            Ok(Err(err)) if err.is_timeout() => {
                outcome.timeout += 1;
                self.errors.record_error(&err);
            }
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "connect failed");
                outcome.fail += 1;
                self.errors.record_error(&err);
            }
            Err(join_err) => {
                tracing::warn!(error = %join_err, "connect task aborted");
                outcome.fail += 1;
            }
        }
    }
}

/// Create a socket for `endpoint`'s family with the configured buffer
/// sizes. Buffer options that cannot be applied are recorded and skipped.
pub(crate) fn new_socket(
    endpoint: &SocketAddr,
    options: &SocketOptions,
    errors: &ErrorClassifier,
) -> Result<TcpSocket> {
    let socket = if endpoint.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if options.sndbuf > 0 {
        errors.record_option("sndbuf", socket.set_send_buffer_size(options.sndbuf));
    }
    if options.rcvbuf > 0 {
        errors.record_option("rcvbuf", socket.set_recv_buffer_size(options.rcvbuf));
    }
    Ok(socket)
}

/// One attempt. The connect and the marker wait share `deadline`.
async fn connect_one(
    index: usize,
    endpoint: SocketAddr,
    framing: Framing,
    options: &SocketOptions,
    errors: &ErrorClassifier,
    deadline: Instant,
) -> Result<Connection> {
    let socket = new_socket(&endpoint, options, errors)?;
    let stream: TcpStream = timeout_at(deadline.into(), socket.connect(endpoint))
        .await
        .map_err(|_| Error::ConnectTimeout)??;
    errors.record_option("nodelay", stream.set_nodelay(options.no_delay));

    match framing {
        Framing::Stream => Ok(Connection::stream(index, stream)),
        Framing::Message => {
            let mut link = MessageLink::new(stream);
            let peer_id = timeout_at(deadline.into(), link.await_connected())
                .await
                .map_err(|_| Error::HandshakeTimeout)??;
            Ok(Connection::message(index, link, peer_id))
        }
    }
}
