//! Assertions over result rows.

use ccubench::{ResultRow, Verdict};

/// Every connection up, every request answered, no consistency faults.
pub fn assert_clean_pass(row: &ResultRow) {
    assert_eq!(row.connect_success, row.ccu as u64, "{row:?}");
    assert_eq!(row.connect_fail, 0, "{row:?}");
    assert_eq!(row.connect_timeout, 0, "{row:?}");
    assert_eq!(row.gating_violation, 0, "{row:?}");
    assert_eq!(row.drain_timeout_count, 0, "{row:?}");
    assert!(!row.warmup_drain_timeout, "{row:?}");
    assert_eq!(row.sent, row.recv, "{row:?}");
    assert_eq!(row.incomplete_ratio, 0.0);
    assert_eq!(row.pass_fail, Verdict::Pass, "{row:?}");
}

pub fn assert_percentiles_zero(row: &ResultRow) {
    assert_eq!(row.p50_us, 0.0);
    assert_eq!(row.p95_us, 0.0);
    assert_eq!(row.p99_us, 0.0);
}
