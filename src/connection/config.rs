//! Connection configuration assembled by [`ConnectionBuilder`](super::ConnectionBuilder).

use std::{fmt, num::NonZeroUsize, sync::Arc, time::Duration};

use super::hooks::FailureHook;
use crate::{
    chunk::{ChunkConfig, Chunker, HeaderCodec, ProtocolVersion},
    message::{BodyCodec, LengthPrefixedHeader},
};

/// Default time a request may wait for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Default period between deadline sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);
/// Default timeout for a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default number of retries after a failed connect attempt.
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;
/// Default pause between connect attempts.
pub const DEFAULT_CONNECT_RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Settings for one connection.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub(super) version: ProtocolVersion,
    pub(super) chunk: ChunkConfig,
    pub(super) request_timeout: Option<Duration>,
    pub(super) sweep_interval: Duration,
    pub(super) max_in_flight: Option<NonZeroUsize>,
    pub(super) connect_timeout: Duration,
    pub(super) max_connect_retries: u32,
    pub(super) connect_retry_pause: Duration,
    pub(super) nodelay: bool,
    pub(super) body_codec: Arc<dyn BodyCodec>,
    pub(super) on_failure: Option<FailureHook>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::default(),
            chunk: ChunkConfig::default(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_in_flight: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_connect_retries: DEFAULT_CONNECT_RETRIES,
            connect_retry_pause: DEFAULT_CONNECT_RETRY_PAUSE,
            nodelay: true,
            body_codec: Arc::new(LengthPrefixedHeader),
            on_failure: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("version", &self.version)
            .field("chunk", &self.chunk)
            .field("request_timeout", &self.request_timeout)
            .field("sweep_interval", &self.sweep_interval)
            .field("max_in_flight", &self.max_in_flight)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_connect_retries", &self.max_connect_retries)
            .field("connect_retry_pause", &self.connect_retry_pause)
            .field("nodelay", &self.nodelay)
            .field("on_failure", &self.on_failure.is_some())
            .finish_non_exhaustive()
    }
}

impl ConnectionConfig {
    /// Protocol version announced in the preamble.
    #[must_use]
    pub const fn version(&self) -> ProtocolVersion { self.version }

    /// Chunk sizing and reassembly limits.
    #[must_use]
    pub const fn chunk(&self) -> &ChunkConfig { &self.chunk }

    /// Deadline applied to requests without their own timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Option<Duration> { self.request_timeout }

    /// How often deadlines and stalled reassemblies are checked.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration { self.sweep_interval }

    /// Hard cap on in-flight requests; `None` leaves backpressure advisory.
    #[must_use]
    pub const fn max_in_flight(&self) -> Option<NonZeroUsize> { self.max_in_flight }

    /// Limit on each connect attempt.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration { self.connect_timeout }

    /// Extra attempts after the first connect failure.
    #[must_use]
    pub const fn max_connect_retries(&self) -> u32 { self.max_connect_retries }

    /// Pause between connect attempts.
    #[must_use]
    pub const fn connect_retry_pause(&self) -> Duration { self.connect_retry_pause }

    /// Whether `TCP_NODELAY` is set on TCP streams.
    #[must_use]
    pub const fn nodelay(&self) -> bool { self.nodelay }

    /// Header codec validating inbound chunks.
    pub(super) fn inbound_codec(&self) -> HeaderCodec {
        HeaderCodec::new(self.version, self.chunk.max_inbound_chunk().get())
    }

    /// Chunker for outbound messages.
    pub(super) fn chunker(&self) -> Chunker {
        let codec = HeaderCodec::new(self.version, self.chunk.chunk_size().get());
        Chunker::new(codec, &self.chunk)
    }
}
