//! Scenario execution.
//!
//! [`run`] executes one configured scenario to completion and returns its
//! [`ResultRow`]. Nothing here returns an error: setup failures become a
//! FAIL row with the error code recorded, an unsupported transport becomes
//! a SKIP row.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::task::JoinSet;

use crate::bench::BenchmarkState;
use crate::bench::worker::{self, TrafficWorker};
use crate::classify::{self, ErrorClassifier};
use crate::config::{BenchConfig, Scenario};
use crate::connection::{Connection, ConnectionPool};
use crate::error::{Error, Result};
use crate::protocol::frame::{LENGTH_PREFIX, MIN_BODY_SIZE};
use crate::protocol::{FrameLayout, Phase};
use crate::report::{ResultRow, Verdict};
use crate::server::EchoServer;

/// Run the configured scenario on the current runtime.
pub async fn run(config: BenchConfig) -> ResultRow {
    let config = config.normalize();

    if !config.is_supported_transport() {
        tracing::warn!(transport = %config.transport, "transport not supported, skipping");
        return ResultRow::skipped(&config);
    }
    if let Err(err) = config.validate() {
        tracing::error!(error = %err, "invalid configuration");
        return failed_row(&config, &err);
    }

    tracing::info!(
        scenario = %config.scenario,
        framing = %config.framing,
        role = %config.role,
        ccu = config.ccu,
        size = config.size,
        inflight = config.inflight,
        "run starting"
    );

    let row = match config.scenario {
        _ if !config.role.runs_clients() => {
            serve_until(&config, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %err, "cannot listen for ctrl-c, stopping");
                }
            })
            .await
        }
        Scenario::S0 => run_smoke(&config).await,
        _ => run_scale(&config).await,
    };

    tracing::info!(verdict = %row.pass_fail, "run finished");
    row
}

/// Build a multi-threaded runtime with `io_threads` workers and run the
/// scenario on it.
pub fn run_blocking(config: BenchConfig) -> ResultRow {
    match build_runtime(config.io_threads) {
        Ok(runtime) => runtime.block_on(run(config)),
        Err(err) => {
            tracing::error!(error = %err, "cannot start runtime");
            failed_row(&config.normalize(), &err)
        }
    }
}

fn build_runtime(io_threads: usize) -> Result<tokio::runtime::Runtime> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(io_threads.max(1))
        .thread_name("ccubench-io")
        .enable_all()
        .build()?;
    Ok(runtime)
}

/// FAIL row carrying the code of a setup error.
fn failed_row(config: &BenchConfig, err: &Error) -> ResultRow {
    let mut row = ResultRow::new(config);
    if let Some(code) = err.code() {
        row.errors_by_errno.insert(code, 1);
    }
    row.pass_fail = Verdict::Fail;
    row
}

/// Serve echo traffic until `shutdown` completes.
///
/// PASS if the server recorded no errors.
pub async fn serve_until<F>(config: &BenchConfig, shutdown: F) -> ResultRow
where
    F: Future<Output = ()>,
{
    let errors = Arc::new(ErrorClassifier::new());
    let mut row = ResultRow::new(config);

    let echo = config.scenario.with_traffic();
    let server = match EchoServer::bind(config, echo, errors.clone()).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "echo server failed to start");
            row.errors_by_errno = errors.snapshot();
            return row;
        }
    };

    shutdown.await;
    server.stop().await;

    row.errors_by_errno = errors.snapshot();
    row.pass_fail = Verdict::from_bool(row.errors_by_errno.is_empty());
    row
}

/// Known, position-dependent filler so any corruption shows up.
fn smoke_packet(layout: FrameLayout, sent_ns: u64) -> BytesMut {
    let mut packet = BytesMut::with_capacity(layout.packet_size());
    layout.encode_into(&mut packet, &layout.template(), Phase::Measured, sent_ns);
    for (i, byte) in packet[LENGTH_PREFIX + MIN_BODY_SIZE..].iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    packet
}

/// One connection, one frame, byte-for-byte comparison of the echo.
async fn run_smoke(config: &BenchConfig) -> ResultRow {
    let errors = Arc::new(ErrorClassifier::new());
    let mut row = ResultRow::new(config);
    row.ccu = 1;

    let server = match EchoServer::bind(config, true, errors.clone()).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "echo server failed to start");
            row.errors_by_errno = errors.snapshot();
            return row;
        }
    };

    let single = config.clone().with_ccu(1);
    let outcome = ConnectionPool::new(&single, errors.clone())
        .establish(server.local_addr())
        .await;
    row.connect_success = outcome.success;
    row.connect_fail = outcome.fail;
    row.connect_timeout = outcome.timeout;

    let mut echoed = false;
    if let Some(mut conn) = outcome.connections.into_iter().next() {
        let layout = FrameLayout::new(config.size);
        let packet = smoke_packet(layout, crate::clock::now_ns());
        row.sent = 1;
        match tokio::time::timeout(config.drain_timeout, conn.round_trip(&packet)).await {
            Ok(Ok(reply)) => {
                row.recv = 1;
                echoed = reply[..] == packet[..];
                if !echoed {
                    tracing::warn!("echo differs from the frame sent");
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "smoke exchange failed");
                errors.record_error(&err);
            }
            Err(_) => {
                tracing::warn!("smoke exchange timed out");
                errors.record(classify::ETIMEDOUT);
            }
        }
    }

    server.stop().await;
    row.incomplete_ratio = crate::report::incomplete_ratio(row.sent, row.recv);
    row.errors_by_errno = errors.snapshot();
    row.pass_fail = Verdict::from_bool(echoed && row.connect_ok());
    row
}

/// Connection scale, and for traffic scenarios the full phase schedule.
async fn run_scale(config: &BenchConfig) -> ResultRow {
    let errors = Arc::new(ErrorClassifier::new());
    let mut row = ResultRow::new(config);

    let echo = config.scenario.with_traffic();
    let server = if config.role.runs_server() {
        match EchoServer::bind(config, echo, errors.clone()).await {
            Ok(server) => Some(server),
            Err(err) => {
                tracing::error!(error = %err, "echo server failed to start");
                row.errors_by_errno = errors.snapshot();
                return row;
            }
        }
    } else {
        None
    };

    let target = match &server {
        Some(server) => server.local_addr(),
        None => match config.endpoint() {
            Ok(addr) => addr,
            Err(err) => {
                errors.record_error(&err);
                row.errors_by_errno = errors.snapshot();
                return row;
            }
        },
    };

    let outcome = ConnectionPool::new(config, errors.clone())
        .establish(target)
        .await;
    row.connect_success = outcome.success;
    row.connect_fail = outcome.fail;
    row.connect_timeout = outcome.timeout;

    if config.scenario.with_traffic() {
        if outcome.connections.is_empty() {
            tracing::warn!("no connection established, skipping traffic");
        } else {
            run_traffic(config, outcome.connections, &errors, &mut row).await;
        }
        row.pass_fail = row.traffic_verdict();
    } else {
        drop(outcome.connections);
        row.pass_fail = row.connect_verdict();
    }

    if let Some(server) = server {
        server.stop().await;
    }
    row.errors_by_errno = errors.snapshot();
    row
}

/// Warm-up, warm-up drain, measure, final drain.
async fn run_traffic(
    config: &BenchConfig,
    connections: Vec<Connection>,
    errors: &Arc<ErrorClassifier>,
    row: &mut ResultRow,
) {
    let state = Arc::new(BenchmarkState::new(config.latency_sample_rate));
    let mut workers = JoinSet::new();
    for (shard, conns) in worker::partition(connections, config.shards)
        .into_iter()
        .enumerate()
    {
        let worker = TrafficWorker::new(shard, conns, config, state.clone(), errors.clone());
        workers.spawn(worker.run());
    }
    tracing::info!(shards = workers.len(), "traffic workers started");

    state.start_warmup();
    pause(config.warmup).await;

    state.begin_warmup_drain();
    if !state.wait_drained(config.drain_timeout).await {
        tracing::warn!(pending = state.pending_total(), "warm-up drain timed out");
        row.warmup_drain_timeout = true;
    }

    state.start_measure();
    tracing::info!(seconds = config.measure.as_secs_f64(), "measurement started");
    pause(config.measure).await;

    state.begin_drain();
    if !state.wait_drained(config.drain_timeout).await {
        tracing::warn!(pending = state.pending_total(), "drain timed out");
        row.drain_timeout_count = 1;
    }

    let snapshot = state.snapshot();
    state.stop();
    state.cancel();

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(report) => tracing::debug!(
                shard = report.shard,
                connections = report.connections,
                sent = report.frames_sent,
                received = report.frames_received,
                closed_on_error = report.closed_on_error,
                "worker joined"
            ),
            Err(err) => tracing::warn!(error = %err, "worker task failed"),
        }
    }

    row.gating_violation = snapshot.gating_violation;
    row.apply_traffic(
        snapshot.sent_measure,
        snapshot.recv_measure,
        config.measure,
        state.take_latencies(),
    );
    tracing::info!(
        sent = row.sent,
        recv = row.recv,
        throughput = row.throughput,
        p99_us = row.p99_us,
        "measurement finished"
    );
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Framing;
    use crate::connection::Role;

    fn quick(scenario: Scenario) -> BenchConfig {
        BenchConfig::new()
            .with_scenario(scenario)
            .with_endpoint("127.0.0.1", 0)
            .with_ccu(8)
            .with_size(32)
            .with_inflight(2)
            .with_phases(
                Duration::from_millis(100),
                Duration::from_millis(300),
                Duration::from_secs(5),
            )
    }

    #[test]
    fn test_smoke_packet_filler() {
        let layout = FrameLayout::new(300);
        let packet = smoke_packet(layout, 42);
        let frame = layout.decode(&packet).unwrap();
        assert_eq!(frame.sent_ns, 42);
        assert_eq!(frame.phase, Phase::Measured);
        assert_eq!(packet[13], 0);
        assert_eq!(packet[13 + 251], 0);
        assert_eq!(packet[14], 1);
    }

    #[tokio::test]
    async fn test_unsupported_transport_skips() {
        let mut config = quick(Scenario::S2);
        config.transport = "ipc".into();
        let row = run(config).await;
        assert_eq!(row.pass_fail, Verdict::Skip);
        assert_eq!(row.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_fails() {
        let config = quick(Scenario::S0).with_role(Role::Client);
        let row = run(config).await;
        assert_eq!(row.pass_fail, Verdict::Fail);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_connect_only_scenario() {
        let row = run(quick(Scenario::S1)).await;
        assert_eq!(row.connect_success, 8);
        assert_eq!(row.sent, 0);
        assert_eq!(row.pass_fail, Verdict::Pass);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_traffic_scenario_message_framing() {
        let row = run(quick(Scenario::S2).with_framing(Framing::Message)).await;
        assert_eq!(row.connect_success, 8);
        assert!(row.recv > 0);
        assert_eq!(row.sent, row.recv);
        assert_eq!(row.pass_fail, Verdict::Pass, "{row:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serve_until_passes_without_errors() {
        let config = quick(Scenario::S2).with_role(Role::Server);
        let row = serve_until(&config, tokio::time::sleep(Duration::from_millis(50))).await;
        assert_eq!(row.pass_fail, Verdict::Pass);
    }
}
