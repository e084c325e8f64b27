//! Command line front-end.
//!
//! Prints one `RESULT` and one `METRIC` line on stdout; logs go to stderr.
//! Exit status is 0 for PASS or SKIP and 2 for FAIL or bad arguments.

use std::path::PathBuf;
use std::time::Duration;

use ccubench::config::SocketOptions;
use ccubench::report::{self, ResultRow};
use ccubench::{BenchConfig, Framing, Role, Scenario};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ccubench")]
#[command(about = "Connection-scale echo benchmark", long_about = None)]
struct Args {
    /// Scenario: s0 smoke, s1 connect only, s2 connect plus traffic
    #[arg(long, default_value = "s0")]
    scenario: Scenario,

    /// Transport; only tcp is supported, anything else is skipped
    #[arg(long, default_value = "tcp")]
    transport: String,

    /// Framing: stream or message
    #[arg(long, default_value = "stream")]
    framing: Framing,

    /// Role: both, server or client
    #[arg(long, default_value = "both")]
    role: Role,

    #[arg(long, default_value = "127.0.0.1")]
    bind_host: String,

    #[arg(long, default_value_t = 27110)]
    port: u16,

    /// Target concurrent connections
    #[arg(long, default_value_t = 10000)]
    ccu: usize,

    /// Frame body size in bytes
    #[arg(long, default_value_t = 1024)]
    size: usize,

    /// Outstanding requests per connection
    #[arg(long, default_value_t = 30)]
    inflight: usize,

    /// Warm-up seconds
    #[arg(long, default_value_t = 3)]
    warmup: u64,

    /// Measured seconds
    #[arg(long, default_value_t = 10)]
    measure: u64,

    /// Seconds to wait for outstanding replies after each phase
    #[arg(long, default_value_t = 10)]
    drain_timeout: u64,

    #[arg(long, default_value_t = 256)]
    connect_concurrency: usize,

    /// Per-connection connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    #[arg(long, default_value_t = 32768)]
    backlog: u32,

    #[arg(long, default_value_t = 262_144)]
    sndbuf: u32,

    #[arg(long, default_value_t = 262_144)]
    rcvbuf: u32,

    /// 1 disables Nagle, 0 keeps it
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    no_delay: u8,

    /// Runtime worker threads
    #[arg(long, default_value_t = 1)]
    io_threads: usize,

    /// Traffic worker tasks
    #[arg(long, default_value_t = 1)]
    shards: usize,

    /// Frames coalesced per write
    #[arg(long, default_value_t = 32)]
    send_batch: usize,

    /// 1 samples every completion, N every Nth, 0 disables
    #[arg(long, default_value_t = 1)]
    latency_sample_rate: u32,

    /// Label written into results instead of the scenario name
    #[arg(long)]
    scenario_id: Option<String>,

    /// Append a CSV row to this file
    #[arg(long, value_name = "PATH")]
    metrics_csv: Option<PathBuf>,

    /// Write a JSON summary to this file
    #[arg(long, value_name = "PATH")]
    summary_json: Option<PathBuf>,
}

impl From<Args> for BenchConfig {
    fn from(args: Args) -> Self {
        BenchConfig {
            scenario: args.scenario,
            transport: args.transport,
            framing: args.framing,
            role: args.role,
            bind_host: args.bind_host,
            port: args.port,
            ccu: args.ccu,
            size: args.size,
            inflight: args.inflight,
            warmup: Duration::from_secs(args.warmup),
            measure: Duration::from_secs(args.measure),
            drain_timeout: Duration::from_secs(args.drain_timeout),
            connect_concurrency: args.connect_concurrency,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            socket: SocketOptions {
                backlog: args.backlog,
                sndbuf: args.sndbuf,
                rcvbuf: args.rcvbuf,
                no_delay: args.no_delay != 0,
            },
            io_threads: args.io_threads,
            shards: args.shards,
            send_batch: args.send_batch,
            latency_sample_rate: args.latency_sample_rate,
            scenario_id: args.scenario_id,
            metrics_csv: args.metrics_csv,
            summary_json: args.summary_json,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn write_outputs(config: &BenchConfig, row: &ResultRow) {
    if let Some(path) = &config.metrics_csv {
        if let Err(err) = report::append_csv(path, row) {
            tracing::warn!(path = %path.display(), error = %err, "cannot append csv row");
        }
    }
    if let Some(path) = &config.summary_json {
        if let Err(err) = report::write_summary_json(path, row) {
            tracing::warn!(path = %path.display(), error = %err, "cannot write summary");
        }
    }
}

fn main() {
    let args = Args::parse();
    init_tracing();

    let config = BenchConfig::from(args);
    let row = ccubench::run_blocking(config.clone());

    println!("{}", report::result_line(&row));
    println!("{}", report::metric_line(&row));
    write_outputs(&config, &row);

    std::process::exit(row.exit_code());
}
