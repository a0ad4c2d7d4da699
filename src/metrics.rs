//! Metric helpers for `vstream`.
//!
//! Names and thin wrappers around the [`metrics`](https://docs.rs/metrics)
//! crate. With the `metrics` feature disabled every helper compiles to a
//! no-op, so call sites never need their own `cfg` guards.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Gauge of open connections.
pub const CONNECTIONS_ACTIVE: &str = "vstream_connections_active";
/// Counter of chunks written or read, labelled by `direction`.
pub const CHUNKS_PROCESSED: &str = "vstream_chunks_processed_total";
/// Counter of continuation chunks that matched no open message.
pub const ORPHAN_CHUNKS: &str = "vstream_orphan_chunks_total";
/// Counter of requests that expired before a response arrived.
pub const REQUEST_TIMEOUTS: &str = "vstream_request_timeouts_total";
/// Counter of request failures, labelled by `kind`.
pub const ERRORS_TOTAL: &str = "vstream_errors_total";

/// Direction of chunk processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Chunks read from the server.
    Inbound,
    /// Chunks written to the server.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record `count` chunks processed in `direction`.
pub fn inc_chunks(direction: Direction, count: u64) {
    #[cfg(feature = "metrics")]
    counter!(CHUNKS_PROCESSED, "direction" => direction.as_str()).increment(count);
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, count);
}

/// Record a continuation chunk with no open message.
pub fn inc_orphan_chunks() {
    #[cfg(feature = "metrics")]
    counter!(ORPHAN_CHUNKS).increment(1);
}

/// Record a request that timed out.
pub fn inc_request_timeouts() {
    #[cfg(feature = "metrics")]
    counter!(REQUEST_TIMEOUTS).increment(1);
}

/// Record a request failure of the given kind.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}
