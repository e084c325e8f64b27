//! Benchmark core: shared phase state, traffic shards and the scenario
//! runner.

mod phase;
pub mod runner;
mod state;
pub mod worker;

pub use phase::RunPhase;
pub use runner::{run, run_blocking, serve_until};
pub use state::{BenchmarkState, StateSnapshot};
pub use worker::{TrafficWorker, WorkerReport};
