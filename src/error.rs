//! Error types for the benchmark harness.
//!
//! Most transport failures never surface as an [`Error`]: they are counted
//! by the [`ErrorClassifier`](crate::classify::ErrorClassifier) and the run
//! continues. This type covers setup failures that abort a run and the
//! per-connection failures a worker reacts to locally.

use thiserror::Error;

use crate::classify;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or running a benchmark.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Configuration value out of range or unparsable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Endpoint could not be resolved to a socket address.
    #[error("Cannot resolve endpoint {0}")]
    Resolve(String),

    /// Listener could not be bound.
    #[error("Bind to {addr} failed: {reason}")]
    Bind {
        /// Requested bind address.
        addr: String,
        /// Underlying failure.
        reason: String,
        /// Classified error code, if any.
        code: Option<i32>,
    },

    /// Connect did not complete before the deadline.
    #[error("Connect timed out")]
    ConnectTimeout,

    /// Connected, but no connection-established marker arrived in time.
    #[error("Timed out waiting for connection-established marker")]
    HandshakeTimeout,

    /// Peer sent something that does not fit the wire format.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Peer closed the connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// I/O error occurred.
    #[error("I/O error: {message}")]
    Io {
        /// Classified error code, if any.
        code: Option<i32>,
        /// Human readable description.
        message: String,
    },
}

impl Error {
    /// Stable error code for the per-code breakdown, if this error has one.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Bind { code, .. } | Error::Io { code, .. } => *code,
            Error::ConnectTimeout | Error::HandshakeTimeout => Some(classify::ETIMEDOUT),
            Error::Resolve(_) => Some(classify::EINVAL),
            Error::ProtocolViolation(_) => Some(classify::EPROTO),
            Error::InvalidConfig(_) | Error::ConnectionClosed => None,
        }
    }

    /// Whether this error is a timeout rather than a hard failure.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Error::ConnectTimeout | Error::HandshakeTimeout)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return Error::ConnectionClosed;
        }
        Error::Io {
            code: classify::code_of(&err),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Bind {
            addr: "127.0.0.1:1".into(),
            reason: "permission denied".into(),
            code: Some(13),
        };
        assert_eq!(err.to_string(), "Bind to 127.0.0.1:1 failed: permission denied");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io { code: Some(32), .. }));
    }

    #[test]
    fn test_eof_becomes_connection_closed() {
        let io_err = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert_eq!(Error::from(io_err), Error::ConnectionClosed);
    }

    #[test]
    fn test_timeouts_share_code() {
        assert!(Error::ConnectTimeout.is_timeout());
        assert!(Error::HandshakeTimeout.is_timeout());
        assert_eq!(Error::ConnectTimeout.code(), Error::HandshakeTimeout.code());
        assert!(!Error::ConnectionClosed.is_timeout());
    }
}
