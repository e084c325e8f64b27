//! End-to-end scenario runs over loopback.

mod harness;

use std::time::Duration;

use ccubench::{Framing, Role, Scenario, Verdict};
use harness::{TestServer, assert_clean_pass, assert_percentiles_zero, closed_port, quick_config};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_smoke_round_trip_passes() {
    let row = ccubench::run(quick_config(Scenario::S0).with_size(1000)).await;
    assert_eq!(row.ccu, 1);
    assert_eq!(row.connect_success, 1);
    assert_eq!(row.sent, 1);
    assert_eq!(row.recv, 1);
    assert_eq!(row.pass_fail, Verdict::Pass, "{row:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_smoke_message_framing_passes() {
    let config = quick_config(Scenario::S0).with_framing(Framing::Message);
    let row = ccubench::run(config).await;
    assert_eq!(row.pass_fail, Verdict::Pass, "{row:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hundred_connections_single_window() {
    let config = quick_config(Scenario::S2)
        .with_ccu(100)
        .with_inflight(1)
        .with_size(64)
        .with_phases(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(10),
        );
    let row = ccubench::run(config).await;
    assert_clean_pass(&row);
    assert!(row.recv > 0);
    assert!(row.throughput > 0.0);
    assert!(row.p50_us <= row.p95_us && row.p95_us <= row.p99_us);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sharded_workers_pass() {
    let config = quick_config(Scenario::S2).with_ccu(40).with_shards(4);
    let row = ccubench::run(config).await;
    assert_clean_pass(&row);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_server_times_out_drain() {
    let server = TestServer::silent(Framing::Stream).await;
    let config = quick_config(Scenario::S2)
        .with_role(Role::Client)
        .with_endpoint("127.0.0.1", server.port())
        .with_ccu(4)
        .with_phases(
            Duration::from_millis(200),
            Duration::from_millis(300),
            Duration::from_secs(1),
        );

    let row = ccubench::run(config).await;
    assert_eq!(row.connect_success, 4);
    assert_eq!(row.drain_timeout_count, 1);
    assert!(row.warmup_drain_timeout);
    assert_eq!(row.recv, 0);
    assert_eq!(row.pass_fail, Verdict::Fail);
    assert_eq!(row.exit_code(), 2);

    let line = ccubench::report::result_line(&row);
    assert!(line.contains(" drain_timeout=1 warmup_drain_timeout=1 "), "{line}");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sampling_disabled_zeroes_percentiles() {
    let config = quick_config(Scenario::S2).with_latency_sample_rate(0);
    let row = ccubench::run(config).await;
    assert!(row.recv > 0);
    assert_percentiles_zero(&row);
    assert_eq!(row.pass_fail, Verdict::Pass, "{row:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_message_framing_passes() {
    let config = quick_config(Scenario::S2).with_framing(Framing::Message);
    let row = ccubench::run(config).await;
    assert_clean_pass(&row);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_role_against_external_server() {
    let server = TestServer::spawn(Framing::Message).await;
    let config = quick_config(Scenario::S2)
        .with_role(Role::Client)
        .with_framing(Framing::Message)
        .with_endpoint("127.0.0.1", server.port());

    let row = ccubench::run(config).await;
    assert_clean_pass(&row);
    assert_eq!(server.accepted(), 16);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_closed_port_counts_connect_failures() {
    let config = quick_config(Scenario::S1)
        .with_role(Role::Client)
        .with_endpoint("127.0.0.1", closed_port())
        .with_ccu(4);

    let row = ccubench::run(config).await;
    assert_eq!(row.connect_success, 0);
    assert!(row.connect_fail > 0);
    assert!(row.errors_by_errno.contains_key(&ccubench::classify::ECONNREFUSED));
    assert_eq!(row.pass_fail, Verdict::Fail);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_only_holds_no_traffic() {
    let row = ccubench::run(quick_config(Scenario::S1).with_ccu(64)).await;
    assert_eq!(row.connect_success, 64);
    assert_eq!(row.sent, 0);
    assert_eq!(row.pass_fail, Verdict::Pass, "{row:?}");
}
