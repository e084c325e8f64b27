//! # ccubench - Connection-scale echo benchmark harness
//!
//! `ccubench` opens many concurrent connections against an echo server and
//! measures how the transport holds up: connect success under load, then
//! request/reply throughput and latency with a bounded in-flight window per
//! connection.
//!
//! ## Features
//!
//! - **Three scenarios**: single-exchange smoke test, connection scale,
//!   connection scale plus traffic
//! - **Two framings**: length-prefixed byte stream, or routing-id/payload
//!   messages with lifecycle markers
//! - **Sharded non-blocking workers** driving thousands of connections from
//!   a handful of tasks
//! - **Exact in-flight accounting** with drain gates between phases
//! - **Machine-readable results**: `RESULT`/`METRIC` lines, CSV rows, JSON
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ccubench::{BenchConfig, Scenario};
//! use std::time::Duration;
//!
//! let config = BenchConfig::new()
//!     .with_scenario(Scenario::S2)
//!     .with_ccu(1000)
//!     .with_inflight(4)
//!     .with_phases(Duration::from_secs(1), Duration::from_secs(5), Duration::from_secs(5));
//! let row = ccubench::run(config).await;
//! println!("{}", ccubench::report::result_line(&row));
//! ```

pub mod bench;
pub mod classify;
pub mod clock;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod report;
pub mod server;

pub use bench::{BenchmarkState, RunPhase, TrafficWorker, run, run_blocking, serve_until};
pub use classify::ErrorClassifier;
pub use clock::{MonotonicClock, TimeSource};
pub use codec::FrameCodec;
pub use config::{BenchConfig, Framing, Scenario, SocketOptions};
pub use connection::{Connection, ConnectionPool, MessageLink, PoolOutcome, Role};
pub use error::{Error, Result};
pub use protocol::{AppFrame, FrameLayout, LifecycleMarker, Phase, StreamReassembler};
pub use report::{ResultRow, Verdict};
pub use server::EchoServer;
