//! Text, CSV and JSON renderings of a [`ResultRow`].

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use crate::classify::format_counts;
use crate::report::ResultRow;

pub const CSV_HEADER: &str = "scenario_id,transport,ccu,inflight,size,connect_success,connect_fail,connect_timeout,sent,recv,incomplete_ratio,throughput,p50,p95,p99,errors_by_errno,pass_fail";

/// The `RESULT ...` summary line.
#[must_use]
pub fn result_line(row: &ResultRow) -> String {
    format!(
        "RESULT scenario={} transport={} ccu={} size={} inflight={} \
         connect_success={} connect_fail={} connect_timeout={} sent={} recv={} \
         incomplete_ratio={:.6} throughput={:.2} p50_us={:.2} p95_us={:.2} p99_us={:.2} \
         drain_timeout={} warmup_drain_timeout={} gating_violation={} pass_fail={}",
        row.scenario_id,
        row.transport,
        row.ccu,
        row.size,
        row.inflight,
        row.connect_success,
        row.connect_fail,
        row.connect_timeout,
        row.sent,
        row.recv,
        row.incomplete_ratio,
        row.throughput,
        row.p50_us,
        row.p95_us,
        row.p99_us,
        u8::from(row.drain_timeout_count > 0 || row.warmup_drain_timeout),
        u8::from(row.warmup_drain_timeout),
        row.gating_violation,
        row.pass_fail,
    )
}

/// The `METRIC ...` line.
#[must_use]
pub fn metric_line(row: &ResultRow) -> String {
    format!(
        "METRIC scenario_id={} transport={} ccu={} inflight={} size={} \
         connect_success={} connect_fail={} connect_timeout={} sent={} recv={} \
         incomplete_ratio={:.6} throughput={:.2} p50={:.2} p95={:.2} p99={:.2} \
         errors_by_errno={} pass_fail={}",
        row.scenario_id,
        row.transport,
        row.ccu,
        row.inflight,
        row.size,
        row.connect_success,
        row.connect_fail,
        row.connect_timeout,
        row.sent,
        row.recv,
        row.incomplete_ratio,
        row.throughput,
        row.p50_us,
        row.p95_us,
        row.p99_us,
        format_counts(&row.errors_by_errno),
        row.pass_fail,
    )
}

fn csv_row(row: &ResultRow) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{:.6},{:.2},{:.2},{:.2},{:.2},\"{}\",{}",
        row.scenario_id,
        row.transport,
        row.ccu,
        row.inflight,
        row.size,
        row.connect_success,
        row.connect_fail,
        row.connect_timeout,
        row.sent,
        row.recv,
        row.incomplete_ratio,
        row.throughput,
        row.p50_us,
        row.p95_us,
        row.p99_us,
        format_counts(&row.errors_by_errno),
        row.pass_fail,
    )
}

/// Append one row to a CSV file, writing the header if the file is new or
/// empty.
pub fn append_csv(path: &Path, row: &ResultRow) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() == 0 {
        writeln!(file, "{CSV_HEADER}")?;
    }
    writeln!(file, "{}", csv_row(row))
}

/// Write the row as an indented JSON object, replacing the file.
pub fn write_summary_json(path: &Path, row: &ResultRow) -> io::Result<()> {
    let json = serde_json::to_string_pretty(row).map_err(io::Error::other)?;
    std::fs::write(path, json + "\n")
}
