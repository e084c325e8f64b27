//! Transport failure classification.
//!
//! Every I/O failure observed during a run is reduced to a small integer
//! code (the platform errno where one exists) and counted. Would-block and
//! interrupted results are not failures and are never counted.

use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

pub const EIO: i32 = 5;
pub const EACCES: i32 = 13;
pub const EINVAL: i32 = 22;
pub const EPIPE: i32 = 32;
pub const EPROTO: i32 = 71;
pub const EADDRINUSE: i32 = 98;
pub const EADDRNOTAVAIL: i32 = 99;
pub const ENETUNREACH: i32 = 101;
pub const ECONNABORTED: i32 = 103;
pub const ECONNRESET: i32 = 104;
pub const ENOBUFS: i32 = 105;
pub const ENOTCONN: i32 = 107;
pub const ETIMEDOUT: i32 = 110;
pub const ECONNREFUSED: i32 = 111;
pub const EHOSTUNREACH: i32 = 113;

/// Map an I/O error to its stable code.
///
/// Returns `None` for results that mean "retry later" rather than failure.
#[must_use]
pub fn code_of(err: &io::Error) -> Option<i32> {
    use io::ErrorKind;

    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::Interrupted => return None,
        _ => {}
    }
    if let Some(raw) = err.raw_os_error() {
        return Some(raw);
    }
    let code = match err.kind() {
        ErrorKind::ConnectionRefused => ECONNREFUSED,
        ErrorKind::ConnectionReset => ECONNRESET,
        ErrorKind::ConnectionAborted => ECONNABORTED,
        ErrorKind::NotConnected => ENOTCONN,
        ErrorKind::AddrInUse => EADDRINUSE,
        ErrorKind::AddrNotAvailable => EADDRNOTAVAIL,
        ErrorKind::BrokenPipe => EPIPE,
        ErrorKind::TimedOut => ETIMEDOUT,
        ErrorKind::InvalidInput => EINVAL,
        ErrorKind::InvalidData => EPROTO,
        ErrorKind::PermissionDenied => EACCES,
        ErrorKind::HostUnreachable => EHOSTUNREACH,
        ErrorKind::NetworkUnreachable => ENETUNREACH,
        ErrorKind::OutOfMemory => ENOBUFS,
        _ => EIO,
    };
    Some(code)
}

/// Whether the operation should simply be retried on a later pass.
#[inline]
#[must_use]
pub fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Peer-initiated teardown that the echo server does not count as an error.
#[must_use]
pub fn is_benign_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::UnexpectedEof
    )
}

/// Thread-safe error-code → count accumulator.
#[derive(Debug, Default)]
pub struct ErrorClassifier {
    counts: Mutex<BTreeMap<i32, u64>>,
}

impl ErrorClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `code`. Non-positive codes are ignored.
    pub fn record(&self, code: i32) {
        if code <= 0 {
            return;
        }
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(code).or_insert(0) += 1;
        }
    }

    /// Classify and count an I/O error.
    ///
    /// Returns `true` if the error was a real failure (and was counted).
    pub fn record_io(&self, err: &io::Error) -> bool {
        match code_of(err) {
            Some(code) => {
                tracing::warn!(code, error = %err, "transport error");
                self.record(code);
                true
            }
            None => false,
        }
    }

    /// Record a socket option that could not be applied. The socket stays
    /// usable, so this never fails the caller.
    pub fn record_option(&self, option: &'static str, result: io::Result<()>) {
        if let Err(err) = result {
            tracing::warn!(option, error = %err, "socket option not applied");
            self.record(code_of(&err).unwrap_or(EINVAL));
        }
    }

    /// Count a harness error if it carries a code.
    pub fn record_error(&self, err: &crate::Error) {
        if let Some(code) = err.code() {
            self.record(code);
        }
    }

    /// Copy of the current counts, ordered by code.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<i32, u64> {
        self.counts.lock().map(|c| c.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.lock().map(|c| c.is_empty()).unwrap_or(true)
    }
}

/// Render counts as `code:count;code:count`.
#[must_use]
pub fn format_counts(counts: &BTreeMap<i32, u64>) -> String {
    counts
        .iter()
        .map(|(code, count)| format!("{code}:{count}"))
        .collect::<Vec<_>>()
        .join(";")
}
