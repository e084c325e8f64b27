//! Traffic shards.
//!
//! A [`TrafficWorker`] owns a disjoint set of connections and drives them
//! with non-blocking operations from a single task: flush the pending
//! batch, queue a new one if the window allows, then read whatever echoes
//! have arrived. When a whole pass makes no progress it spins briefly and
//! then yields to the runtime.

use std::io;
use std::sync::Arc;

use bytes::Bytes;

use crate::bench::BenchmarkState;
use crate::classify::{self, ErrorClassifier};
use crate::codec::FrameCodec;
use crate::config::BenchConfig;
use crate::connection::{Connection, TrafficConnState};
use crate::protocol::FrameLayout;

/// Batches queued per connection per pass.
pub const SEND_BURST: usize = 2;

const IDLE_SPINS: u32 = 64;
const BUSY_PASSES_PER_YIELD: u32 = 8;
const MIN_SCRATCH: usize = 64 * 1024;

/// What a shard did over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub shard: usize,
    pub connections: usize,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub closed_on_error: usize,
    /// Frames still unanswered when the shard exited.
    pub abandoned: u64,
}

/// Cooperative driver for one shard of connections.
pub struct TrafficWorker {
    shard: usize,
    conns: Vec<TrafficConnState>,
    state: Arc<BenchmarkState>,
    errors: Arc<ErrorClassifier>,
    codec: FrameCodec,
    layout: FrameLayout,
    template: Bytes,
    inflight: usize,
    max_batch: usize,
    scratch: Vec<u8>,
    report: WorkerReport,
}

impl TrafficWorker {
    #[must_use]
    pub fn new(
        shard: usize,
        connections: Vec<Connection>,
        config: &BenchConfig,
        state: Arc<BenchmarkState>,
        errors: Arc<ErrorClassifier>,
    ) -> Self {
        let layout = FrameLayout::new(config.size);
        let packet_size = layout.packet_size();
        let conns: Vec<_> = connections
            .into_iter()
            .map(|conn| TrafficConnState::new(conn, packet_size))
            .collect();
        let report = WorkerReport {
            shard,
            connections: conns.len(),
            ..WorkerReport::default()
        };
        Self {
            shard,
            conns,
            state,
            errors,
            codec: FrameCodec::for_framing(config.framing),
            layout,
            template: layout.template(),
            inflight: config.inflight.max(1),
            max_batch: config.max_batch(),
            scratch: vec![0u8; MIN_SCRATCH.max(packet_size * 64)],
            report,
        }
    }

    #[must_use]
    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Drive the shard until the run is cancelled, or sending has stopped
    /// for good and every connection is quiescent.
    pub async fn run(mut self) -> WorkerReport {
        tracing::debug!(shard = self.shard, connections = self.conns.len(), "worker started");
        let mut busy_passes = 0u32;

        loop {
            if self.state.is_cancelled() {
                break;
            }
            let send_enabled = self.state.send_enabled();
            let progressed = self.poll_pass(send_enabled);

            if !send_enabled && self.state.phase().is_final() && self.is_quiescent() {
                break;
            }

            if progressed {
                busy_passes += 1;
                if busy_passes >= BUSY_PASSES_PER_YIELD {
                    busy_passes = 0;
                    tokio::task::yield_now().await;
                }
            } else {
                busy_passes = 0;
                for _ in 0..IDLE_SPINS {
                    std::hint::spin_loop();
                }
                tokio::task::yield_now().await;
            }
        }

        self.shutdown()
    }

    /// One pass over every open connection. Returns whether anything moved.
    pub fn poll_pass(&mut self, send_enabled: bool) -> bool {
        let mut progressed = false;
        for i in 0..self.conns.len() {
            match self.poll_connection(i, send_enabled) {
                Ok(moved) => progressed |= moved,
                Err(err) => {
                    self.close_on_error(i, &err);
                    progressed = true;
                }
            }
        }
        progressed
    }

    fn poll_connection(&mut self, i: usize, send_enabled: bool) -> io::Result<bool> {
        let codec = self.codec;
        let layout = self.layout;
        let inflight = self.inflight;
        let state = &self.state;
        let report = &mut self.report;
        let slot = &mut self.conns[i];
        let Some(conn) = slot.conn.as_mut() else {
            return Ok(false);
        };

        let mut progressed = codec.flush(conn, &mut slot.out)?.progressed();

        if send_enabled {
            for _ in 0..SEND_BURST {
                if !slot.out.is_empty() || slot.pending >= inflight {
                    break;
                }
                let frames = self.max_batch.min(inflight - slot.pending);
                let phase = state.frame_phase();
                let batch = slot.out.begin();
                for _ in 0..frames {
                    layout.encode_into(batch, &self.template, phase, state.now_ns());
                }
                slot.pending += frames;
                state.on_sent(phase, frames as u64);
                report.frames_sent += frames as u64;
                progressed = true;

                codec.flush(conn, &mut slot.out)?;
            }
        }

        if slot.pending > 0 || !slot.rx.is_idle() {
            let pending = &mut slot.pending;
            let received = &mut report.frames_received;
            progressed |= codec.receive(conn, &mut slot.rx, &mut self.scratch, |packet| {
                if let Some(frame) = layout.decode(packet) {
                    *pending = pending.saturating_sub(1);
                    *received += 1;
                    state.on_recv(frame.phase, frame.sent_ns);
                }
            })?;
        }

        Ok(progressed)
    }

    fn close_on_error(&mut self, i: usize, err: &io::Error) {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            self.errors.record(classify::ECONNRESET);
        } else {
            self.errors.record_io(err);
        }
        let dropped = self.conns[i].close() as u64;
        self.state.drop_pending(dropped);
        self.report.closed_on_error += 1;
        self.report.abandoned += dropped;
        tracing::debug!(shard = self.shard, conn = i, dropped, error = %err, "connection closed");
    }

    fn is_quiescent(&self) -> bool {
        self.conns.iter().all(TrafficConnState::is_quiescent)
    }

    fn shutdown(mut self) -> WorkerReport {
        let mut abandoned = 0u64;
        for slot in &mut self.conns {
            abandoned += slot.close() as u64;
        }
        self.state.drop_pending(abandoned);
        self.report.abandoned += abandoned;
        tracing::debug!(
            shard = self.shard,
            sent = self.report.frames_sent,
            received = self.report.frames_received,
            abandoned,
            "worker finished"
        );
        self.report
    }
}

/// Split connections round-robin across `shards` workers.
///
/// The shard count is clamped to `1..=connections.len()`.
#[must_use]
pub fn partition(connections: Vec<Connection>, shards: usize) -> Vec<Vec<Connection>> {
    let count = shards.min(connections.len()).max(1);
    let mut out: Vec<Vec<Connection>> = (0..count).map(|_| Vec::new()).collect();
    for (i, conn) in connections.into_iter().enumerate() {
        out[i % count].push(conn);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn echo_pair() -> (Connection, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stream.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        let stream = TcpStream::connect(addr).await.unwrap();
        (Connection::stream(0, stream), server)
    }

    fn config() -> BenchConfig {
        BenchConfig::new().with_size(64).with_inflight(4)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_keeps_window_and_drains() {
        let (conn, server) = echo_pair().await;
        let state = Arc::new(BenchmarkState::new(1));
        let errors = Arc::new(ErrorClassifier::new());
        let worker = TrafficWorker::new(0, vec![conn], &config(), state.clone(), errors.clone());
        let handle = tokio::spawn(worker.run());

        state.start_measure();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(state.pending_total() <= 4);

        state.begin_drain();
        assert!(state.wait_drained(Duration::from_secs(5)).await);
        let report = handle.await.unwrap();

        let snap = state.snapshot();
        assert!(snap.sent_measure > 0);
        assert_eq!(snap.sent_measure, snap.recv_measure);
        assert_eq!(snap.gating_violation, 0);
        assert_eq!(report.frames_sent, report.frames_received);
        assert_eq!(report.closed_on_error, 0);
        assert!(errors.is_empty());
        server.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_peer_close_drops_pending() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(stream);
        });
        let conn = Connection::stream(0, TcpStream::connect(addr).await.unwrap());

        let state = Arc::new(BenchmarkState::new(1));
        let errors = Arc::new(ErrorClassifier::new());
        let worker = TrafficWorker::new(0, vec![conn], &config(), state.clone(), errors.clone());
        let handle = tokio::spawn(worker.run());

        state.start_warmup();
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        state.begin_drain();
        let report = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.closed_on_error, 1);
        assert_eq!(state.pending_total(), 0);
        assert!(!errors.is_empty());
    }

    #[tokio::test]
    async fn test_partition_round_robin() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut conns = Vec::new();
        for i in 0..5 {
            conns.push(Connection::stream(i, TcpStream::connect(addr).await.unwrap()));
        }

        let shards = partition(conns, 2);
        assert_eq!(shards.len(), 2);
        let first: Vec<_> = shards[0].iter().map(Connection::index).collect();
        let second: Vec<_> = shards[1].iter().map(Connection::index).collect();
        assert_eq!(first, vec![0, 2, 4]);
        assert_eq!(second, vec![1, 3]);
    }

    #[test]
    fn test_partition_empty() {
        let shards = partition(Vec::new(), 4);
        assert_eq!(shards.len(), 1);
        assert!(shards[0].is_empty());
    }
}
