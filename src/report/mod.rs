//! Result aggregation and the pass/fail verdict.

mod output;

pub use output::{CSV_HEADER, append_csv, metric_line, result_line, write_summary_json};

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::classify;
use crate::config::BenchConfig;

/// Largest tolerated share of measured frames without a reply.
pub const MAX_INCOMPLETE_RATIO: f64 = 0.01;

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Verdict {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    /// The run could not be attempted, e.g. unsupported transport.
    #[serde(rename = "SKIP")]
    Skip,
}

impl Verdict {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Skip => "SKIP",
        }
    }

    #[must_use]
    pub const fn from_bool(pass: bool) -> Self {
        if pass { Verdict::Pass } else { Verdict::Fail }
    }

    /// Process exit code: 0 unless the run failed.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Verdict::Pass | Verdict::Skip => 0,
            Verdict::Fail => 2,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn serialize_counts<S: Serializer>(counts: &BTreeMap<i32, u64>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&classify::format_counts(counts))
}

/// One result row per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub scenario_id: String,
    pub transport: String,
    pub ccu: usize,
    pub inflight: usize,
    pub size: usize,
    pub connect_success: u64,
    pub connect_fail: u64,
    pub connect_timeout: u64,
    pub sent: u64,
    pub recv: u64,
    pub incomplete_ratio: f64,
    pub throughput: f64,
    #[serde(rename = "p50")]
    pub p50_us: f64,
    #[serde(rename = "p95")]
    pub p95_us: f64,
    #[serde(rename = "p99")]
    pub p99_us: f64,
    #[serde(serialize_with = "serialize_counts")]
    pub errors_by_errno: BTreeMap<i32, u64>,
    pub drain_timeout_count: u64,
    pub warmup_drain_timeout: bool,
    pub gating_violation: u64,
    pub pass_fail: Verdict,
}

impl ResultRow {
    /// Empty row labelled from `config`, verdict FAIL until judged.
    #[must_use]
    pub fn new(config: &BenchConfig) -> Self {
        Self {
            scenario_id: config.scenario_id().to_string(),
            transport: config.transport.clone(),
            ccu: config.ccu,
            inflight: config.inflight,
            size: config.size,
            connect_success: 0,
            connect_fail: 0,
            connect_timeout: 0,
            sent: 0,
            recv: 0,
            incomplete_ratio: 0.0,
            throughput: 0.0,
            p50_us: 0.0,
            p95_us: 0.0,
            p99_us: 0.0,
            errors_by_errno: BTreeMap::new(),
            drain_timeout_count: 0,
            warmup_drain_timeout: false,
            gating_violation: 0,
            pass_fail: Verdict::Fail,
        }
    }

    /// Row for a run that was not attempted.
    #[must_use]
    pub fn skipped(config: &BenchConfig) -> Self {
        Self {
            pass_fail: Verdict::Skip,
            ..Self::new(config)
        }
    }

    /// Fill in traffic results from the measured window.
    pub fn apply_traffic(
        &mut self,
        sent: u64,
        recv: u64,
        measure: Duration,
        latencies_us: Vec<f64>,
    ) {
        self.sent = sent;
        self.recv = recv;
        self.incomplete_ratio = incomplete_ratio(sent, recv);
        self.throughput = throughput(recv, measure);
        let summary = LatencySummary::from_samples(latencies_us);
        self.p50_us = summary.p50;
        self.p95_us = summary.p95;
        self.p99_us = summary.p99;
    }

    /// All connection attempts succeeded.
    #[must_use]
    pub fn connect_ok(&self) -> bool {
        self.connect_success == self.ccu as u64
            && self.connect_fail == 0
            && self.connect_timeout == 0
    }

    /// Verdict for a traffic scenario.
    #[must_use]
    pub fn traffic_verdict(&self) -> Verdict {
        Verdict::from_bool(
            self.connect_ok()
                && self.recv > 0
                && self.incomplete_ratio <= MAX_INCOMPLETE_RATIO
                && self.drain_timeout_count == 0
                && !self.warmup_drain_timeout
                && self.gating_violation == 0,
        )
    }

    /// Verdict for a connection-only scenario.
    #[must_use]
    pub fn connect_verdict(&self) -> Verdict {
        Verdict::from_bool(self.connect_ok())
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.pass_fail.exit_code()
    }
}

/// Share of measured frames that were sent but never answered.
///
/// Clamped to `[0, 1]`; 0 when nothing was sent.
#[must_use]
pub fn incomplete_ratio(sent: u64, recv: u64) -> f64 {
    if sent == 0 {
        return 0.0;
    }
    let missing = sent.saturating_sub(recv) as f64;
    (missing / sent as f64).clamp(0.0, 1.0)
}

/// Replies per second over the measured window.
#[must_use]
pub fn throughput(recv: u64, measure: Duration) -> f64 {
    let secs = measure.as_secs_f64();
    if secs > 0.0 { recv as f64 / secs } else { 0.0 }
}

/// Nearest-rank percentile of an ascending slice: element
/// `ceil(n * p) - 1`, clamped to the valid range. 0 for no samples.
#[must_use]
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (sorted.len() as f64 * p).ceil() as i64 - 1;
    let idx = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[idx]
}

/// Percentile of unsorted samples.
#[must_use]
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, p)
}

/// p50/p95/p99 of one run's samples, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySummary {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub samples: usize,
}

impl LatencySummary {
    /// Sort once and pick the three percentiles.
    #[must_use]
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        samples.sort_by(f64::total_cmp);
        Self {
            p50: percentile_sorted(&samples, 0.50),
            p95: percentile_sorted(&samples, 0.95),
            p99: percentile_sorted(&samples, 0.99),
            samples: samples.len(),
        }
    }
}
