//! Run-wide counters and phase flags shared by every worker.
//!
//! Workers read the flags without locks on every pass; the runner is the
//! only writer. Counter updates are relaxed: only the final totals matter,
//! and they are read after all workers have been joined.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::bench::RunPhase;
use crate::clock::{MonotonicClock, TimeSource};
use crate::protocol::Phase;

const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    pub pending_total: i64,
    pub sent_measure: u64,
    pub recv_measure: u64,
    pub gating_violation: u64,
    pub latency_samples: usize,
}

/// Shared benchmark state: phase flags, in-flight ledger, measured counters
/// and latency samples.
pub struct BenchmarkState {
    send_enabled: AtomicBool,
    measure_enabled: AtomicBool,
    cancelled: AtomicBool,
    phase: AtomicU8,

    pending_total: AtomicI64,
    sent_measure: AtomicU64,
    recv_measure: AtomicU64,
    gating_violation: AtomicU64,

    sample_rate: u32,
    sample_seq: AtomicU64,
    latencies_us: Mutex<Vec<f64>>,
    clock: Box<dyn TimeSource>,
}

impl std::fmt::Debug for BenchmarkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkState")
            .field("phase", &self.phase())
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl BenchmarkState {
    /// State with the process monotonic clock.
    ///
    /// `sample_rate` 0 disables latency sampling; `n` keeps every n-th
    /// measured completion.
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self::with_clock(sample_rate, Box::new(MonotonicClock))
    }

    #[must_use]
    pub fn with_clock(sample_rate: u32, clock: Box<dyn TimeSource>) -> Self {
        Self {
            send_enabled: AtomicBool::new(false),
            measure_enabled: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            phase: AtomicU8::new(RunPhase::Idle as u8),
            pending_total: AtomicI64::new(0),
            sent_measure: AtomicU64::new(0),
            recv_measure: AtomicU64::new(0),
            gating_violation: AtomicU64::new(0),
            sample_rate,
            sample_seq: AtomicU64::new(0),
            latencies_us: Mutex::new(Vec::new()),
            clock,
        }
    }

    #[inline]
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    // ---- phase control ----

    /// Set the raw send and measure flags.
    pub fn set_phase(&self, send: bool, measure: bool) {
        self.measure_enabled.store(measure, Ordering::Release);
        self.send_enabled.store(send, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn send_enabled(&self) -> bool {
        self.send_enabled.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn measure_enabled(&self) -> bool {
        self.measure_enabled.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Tag for frames built now.
    #[inline]
    #[must_use]
    pub fn frame_phase(&self) -> Phase {
        if self.measure_enabled() {
            Phase::Measured
        } else {
            Phase::Warmup
        }
    }

    fn enter(&self, phase: RunPhase) {
        self.phase.store(phase as u8, Ordering::Release);
        self.set_phase(phase.is_sending(), phase.is_measuring());
        tracing::debug!(%phase, "phase change");
    }

    pub fn start_warmup(&self) {
        self.enter(RunPhase::Warmup);
    }

    pub fn begin_warmup_drain(&self) {
        self.enter(RunPhase::WarmupDrain);
    }

    /// Zero the measured counters and start sending measured frames.
    pub fn start_measure(&self) {
        self.reset_measure_metrics();
        self.enter(RunPhase::Measure);
    }

    /// Stop sending for good.
    pub fn begin_drain(&self) {
        self.enter(RunPhase::Drain);
    }

    pub fn stop(&self) {
        self.enter(RunPhase::Stopped);
    }

    /// Ask workers to exit at their next pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    // ---- accounting ----

    /// Record frames handed to the transport.
    pub fn on_sent(&self, phase: Phase, frames: u64) {
        if frames == 0 {
            return;
        }
        self.pending_total.fetch_add(frames as i64, Ordering::Relaxed);
        if phase.is_measured() {
            self.sent_measure.fetch_add(frames, Ordering::Relaxed);
        }
    }

    /// Record one echoed frame.
    pub fn on_recv(&self, phase: Phase, sent_ns: u64) {
        let before = self.pending_total.fetch_sub(1, Ordering::Relaxed);
        if before <= 0 {
            self.gating_violation.fetch_add(1, Ordering::Relaxed);
        }
        if !phase.is_measured() {
            return;
        }
        self.recv_measure.fetch_add(1, Ordering::Relaxed);

        if sent_ns == 0 || !self.should_sample() {
            return;
        }
        let now = self.now_ns();
        let latency_us = now.saturating_sub(sent_ns) as f64 / 1000.0;
        if let Ok(mut samples) = self.latencies_us.lock() {
            samples.push(latency_us);
        }
    }

    fn should_sample(&self) -> bool {
        match self.sample_rate {
            0 => false,
            1 => true,
            rate => {
                let seq = self.sample_seq.fetch_add(1, Ordering::Relaxed) + 1;
                seq % u64::from(rate) == 0
            }
        }
    }

    /// Forget frames that will never be answered, e.g. on a closed
    /// connection.
    pub fn drop_pending(&self, frames: u64) {
        if frames > 0 {
            self.pending_total.fetch_sub(frames as i64, Ordering::Relaxed);
        }
    }

    /// Zero the measured counters, gating violations and samples.
    ///
    /// The in-flight ledger is left alone: warm-up frames still in flight
    /// are still owed a reply.
    pub fn reset_measure_metrics(&self) {
        self.sent_measure.store(0, Ordering::Relaxed);
        self.recv_measure.store(0, Ordering::Relaxed);
        self.gating_violation.store(0, Ordering::Relaxed);
        self.sample_seq.store(0, Ordering::Relaxed);
        if let Ok(mut samples) = self.latencies_us.lock() {
            samples.clear();
        }
    }

    #[inline]
    #[must_use]
    pub fn pending_total(&self) -> i64 {
        self.pending_total.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            pending_total: self.pending_total.load(Ordering::Acquire),
            sent_measure: self.sent_measure.load(Ordering::Acquire),
            recv_measure: self.recv_measure.load(Ordering::Acquire),
            gating_violation: self.gating_violation.load(Ordering::Acquire),
            latency_samples: self.latencies_us.lock().map(|s| s.len()).unwrap_or(0),
        }
    }

    /// Move the collected latency samples (µs) out.
    #[must_use]
    pub fn take_latencies(&self) -> Vec<f64> {
        self.latencies_us
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }

    /// Poll until no frame is in flight.
    ///
    /// Returns `false` if `timeout` elapsed first or the run was cancelled.
    pub async fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending_total() <= 0 {
                return true;
            }
            if self.is_cancelled() || Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}
