//! Configuration bounding chunk sizes and reassembly resource usage.

use std::{num::NonZeroUsize, time::Duration};

use super::header::FIRST_HEADER_LEN;

/// Default outbound chunk size, header included.
pub const DEFAULT_CHUNK_SIZE: usize = 30 * 1024;
/// Default cap on a single inbound chunk, header included.
pub const DEFAULT_MAX_INBOUND_CHUNK: usize = 1024 * 1024;
/// Default cap on a fully reassembled message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;
/// Default age after which an incomplete inbound message is evicted.
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(60);

/// Smallest outbound chunk size: a first header plus one payload byte.
pub const MIN_CHUNK_SIZE: usize = FIRST_HEADER_LEN + 1;

/// Settings shared by the chunker, the inbound codec and the reassembler.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use vstream::chunk::ChunkConfig;
///
/// let config = ChunkConfig::default()
///     .with_chunk_size(1000)
///     .with_reassembly_timeout(Duration::from_secs(5));
/// assert_eq!(config.chunk_size().get(), 1000);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: NonZeroUsize,
    max_inbound_chunk: NonZeroUsize,
    max_message_size: NonZeroUsize,
    reassembly_timeout: Duration,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: non_zero(DEFAULT_CHUNK_SIZE),
            max_inbound_chunk: non_zero(DEFAULT_MAX_INBOUND_CHUNK),
            max_message_size: non_zero(DEFAULT_MAX_MESSAGE_SIZE),
            reassembly_timeout: DEFAULT_REASSEMBLY_TIMEOUT,
        }
    }
}

const fn non_zero(value: usize) -> NonZeroUsize {
    match NonZeroUsize::new(value) {
        Some(value) => value,
        None => NonZeroUsize::MIN,
    }
}

impl ChunkConfig {
    /// Set the outbound chunk size `M`, header included.
    ///
    /// Values below [`MIN_CHUNK_SIZE`] are raised to it so every chunk can
    /// carry payload.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = non_zero(size.max(MIN_CHUNK_SIZE));
        self
    }

    /// Set the largest inbound chunk accepted before the stream is deemed
    /// corrupt.
    #[must_use]
    pub fn with_max_inbound_chunk(mut self, size: usize) -> Self {
        self.max_inbound_chunk = non_zero(size.max(MIN_CHUNK_SIZE));
        self
    }

    /// Set the largest message accepted in either direction.
    #[must_use]
    pub fn with_max_message_size(mut self, size: NonZeroUsize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set how long an incomplete inbound message may wait for its chunks.
    #[must_use]
    pub fn with_reassembly_timeout(mut self, timeout: Duration) -> Self {
        self.reassembly_timeout = timeout;
        self
    }

    /// Outbound chunk size, header included.
    #[must_use]
    pub const fn chunk_size(&self) -> NonZeroUsize { self.chunk_size }

    /// Largest inbound chunk length.
    #[must_use]
    pub const fn max_inbound_chunk(&self) -> NonZeroUsize { self.max_inbound_chunk }

    /// Largest message size.
    #[must_use]
    pub const fn max_message_size(&self) -> NonZeroUsize { self.max_message_size }

    /// Reassembly eviction timeout.
    #[must_use]
    pub const fn reassembly_timeout(&self) -> Duration { self.reassembly_timeout }
}
