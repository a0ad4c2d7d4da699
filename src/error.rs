//! Canonical error and result types for the crate.
//!
//! [`Error`] is what a request resolves with when no response can be
//! delivered. It is `Clone` so one connection failure can be fanned out to
//! every pending request. [`ErrorCode`] is the stable numeric form reported by
//! [`Connection::last_error`](crate::Connection::last_error).

use std::fmt;

use thiserror::Error as ThisError;

/// Result alias for request outcomes.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reason a request or connection failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ThisError)]
pub enum Error {
    /// The endpoint could not be reached within the retry budget.
    #[error("could not connect to endpoint")]
    CouldNotConnect,
    /// The peer closed the stream.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// The connection was closed locally.
    #[error("connection close requested")]
    CloseRequested,
    /// No response arrived before the request deadline.
    #[error("request timed out")]
    Timeout,
    /// The in-flight request cap was reached.
    #[error("too many requests in flight")]
    QueueCapacityExceeded,
    /// Reading from the transport failed.
    #[error("failed to read from connection")]
    ReadError,
    /// Writing to the transport failed.
    #[error("failed to write to connection")]
    WriteError,
    /// The request was canceled before a response arrived.
    #[error("request canceled")]
    Canceled,
    /// The peer violated the wire protocol.
    #[error("protocol error")]
    ProtocolError,
}

impl Error {
    /// Numeric code for this error.
    #[must_use]
    pub const fn code(self) -> ErrorCode {
        match self {
            Self::CouldNotConnect => ErrorCode::CouldNotConnect,
            Self::ConnectionClosed => ErrorCode::ConnectionClosed,
            Self::CloseRequested => ErrorCode::CloseRequested,
            Self::Timeout => ErrorCode::Timeout,
            Self::QueueCapacityExceeded => ErrorCode::QueueCapacityExceeded,
            Self::ReadError => ErrorCode::ReadError,
            Self::WriteError => ErrorCode::WriteError,
            Self::Canceled => ErrorCode::Canceled,
            Self::ProtocolError => ErrorCode::ProtocolError,
        }
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::CouldNotConnect => "could_not_connect",
            Self::ConnectionClosed => "connection_closed",
            Self::CloseRequested => "close_requested",
            Self::Timeout => "timeout",
            Self::QueueCapacityExceeded => "queue_capacity_exceeded",
            Self::ReadError => "read_error",
            Self::WriteError => "write_error",
            Self::Canceled => "canceled",
            Self::ProtocolError => "protocol_error",
        }
    }
}

/// Stable numeric error codes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    #[default]
    NoError = 0,
    CouldNotConnect = 1000,
    CloseRequested = 1001,
    ConnectionClosed = 1002,
    Timeout = 1003,
    QueueCapacityExceeded = 1004,
    ReadError = 1102,
    WriteError = 1103,
    Canceled = 1104,
    ProtocolError = 3000,
}

impl ErrorCode {
    /// Numeric value of the code.
    #[must_use]
    pub const fn as_u16(self) -> u16 { self as u16 }

    /// Recover a code from its numeric value.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0 => Self::NoError,
            1000 => Self::CouldNotConnect,
            1001 => Self::CloseRequested,
            1002 => Self::ConnectionClosed,
            1003 => Self::Timeout,
            1004 => Self::QueueCapacityExceeded,
            1102 => Self::ReadError,
            1103 => Self::WriteError,
            1104 => Self::Canceled,
            3000 => Self::ProtocolError,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_u16()) }
}

impl From<Error> for ErrorCode {
    fn from(error: Error) -> Self { error.code() }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Error, ErrorCode};

    #[rstest]
    #[case(Error::CouldNotConnect, 1000)]
    #[case(Error::CloseRequested, 1001)]
    #[case(Error::ConnectionClosed, 1002)]
    #[case(Error::Timeout, 1003)]
    #[case(Error::QueueCapacityExceeded, 1004)]
    #[case(Error::ReadError, 1102)]
    #[case(Error::WriteError, 1103)]
    #[case(Error::Canceled, 1104)]
    #[case(Error::ProtocolError, 3000)]
    fn codes_are_stable(#[case] error: Error, #[case] code: u16) {
        assert_eq!(error.code().as_u16(), code);
        assert_eq!(ErrorCode::from_u16(code), Some(error.code()));
    }

    #[test]
    fn unknown_codes_do_not_parse() {
        assert_eq!(ErrorCode::from_u16(0), Some(ErrorCode::NoError));
        assert_eq!(ErrorCode::from_u16(42), None);
    }
}
