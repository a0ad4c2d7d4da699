//! Outbound helper that splits logical messages into wire chunks.
//!
//! [`Chunker`] turns one payload into the ordered list of encoded chunks that
//! must be written back to back. Every piece carries the same payload share,
//! `M - FIRST_HEADER_LEN`, so a chunk's byte offset within its message is a
//! pure function of its index. It performs no I/O.

use std::num::NonZeroUsize;

use bytes::{Bytes, BytesMut};

use super::{
    ChunkConfig,
    ChunkHeader,
    ChunkIndex,
    ChunkingError,
    HeaderCodec,
    MessageId,
    header::FIRST_HEADER_LEN,
};

/// Splits message payloads into encoded chunks.
#[derive(Clone, Copy, Debug)]
pub struct Chunker {
    codec: HeaderCodec,
    chunk_size: NonZeroUsize,
    max_message_size: NonZeroUsize,
}

impl Chunker {
    /// Create a chunker writing headers with `codec` and sizing chunks per
    /// `config`.
    #[must_use]
    pub fn new(codec: HeaderCodec, config: &ChunkConfig) -> Self {
        Self {
            codec,
            chunk_size: config.chunk_size(),
            max_message_size: config.max_message_size(),
        }
    }

    /// Maximum chunk size `M`, header included.
    #[must_use]
    pub const fn chunk_size(&self) -> NonZeroUsize { self.chunk_size }

    /// Payload bytes carried by every chunk except possibly the last.
    #[must_use]
    pub fn piece_size(&self) -> usize { self.chunk_size.get().saturating_sub(FIRST_HEADER_LEN).max(1) }

    /// Number of chunks a payload of `len` bytes needs.
    ///
    /// # Examples
    ///
    /// ```
    /// use vstream::chunk::{ChunkConfig, Chunker, HeaderCodec, ProtocolVersion};
    ///
    /// let config = ChunkConfig::default().with_chunk_size(1000);
    /// let chunker = Chunker::new(HeaderCodec::new(ProtocolVersion::V1_1, 1000), &config);
    /// assert_eq!(chunker.chunk_count(0), 1);
    /// assert_eq!(chunker.chunk_count(976), 1);
    /// assert_eq!(chunker.chunk_count(977), 2);
    /// ```
    #[must_use]
    pub fn chunk_count(&self, len: usize) -> usize { len.div_ceil(self.piece_size()).max(1) }

    /// Split `payload` into chunks tagged with `message_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::MessageTooLarge`] when the payload exceeds the
    /// configured message cap and [`ChunkingError::TooManyChunks`] when the
    /// chunk count does not fit the protocol version's flag bits.
    pub fn chunk(
        &self,
        message_id: MessageId,
        payload: impl AsRef<[u8]>,
    ) -> Result<ChunkBatch, ChunkingError> {
        let payload = payload.as_ref();
        let total = payload.len();
        if total > self.max_message_size.get() {
            return Err(ChunkingError::MessageTooLarge {
                size: total,
                limit: self.max_message_size.get(),
            });
        }

        let required = self.chunk_count(total);
        let max = self.codec.version().max_field_value();
        let count = u32::try_from(required)
            .ok()
            .filter(|count| *count <= max)
            .ok_or(ChunkingError::TooManyChunks { required, max })?;

        let piece = self.piece_size();
        let mut chunks = Vec::with_capacity(required);
        let mut pieces = payload.chunks(piece);

        let first_piece = pieces.next().unwrap_or_default();
        let header = ChunkHeader::first(message_id, count, total as u64, first_piece.len());
        chunks.push(self.encode_chunk(header, first_piece)?);

        let mut index = ChunkIndex::zero();
        for piece in pieces {
            index = index.checked_increment().ok_or(ChunkingError::TooManyChunks {
                required,
                max,
            })?;
            let header = ChunkHeader::continuation(message_id, index, piece.len());
            chunks.push(self.encode_chunk(header, piece)?);
        }

        Ok(ChunkBatch::new(message_id, chunks))
    }

    fn encode_chunk(&self, header: ChunkHeader, payload: &[u8]) -> Result<Chunk, ChunkingError> {
        let mut buf = BytesMut::with_capacity(header.header_len() + payload.len());
        self.codec.encode(&header, &mut buf)?;
        buf.extend_from_slice(payload);
        Ok(Chunk::new(header, buf.freeze()))
    }
}

/// One encoded chunk: header bytes followed by its payload share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    header: ChunkHeader,
    bytes: Bytes,
}

impl Chunk {
    /// Pair a decoded header with the full encoded chunk bytes.
    #[must_use]
    pub fn new(header: ChunkHeader, bytes: Bytes) -> Self { Self { header, bytes } }

    /// Chunk header.
    #[must_use]
    pub const fn header(&self) -> &ChunkHeader { &self.header }

    /// Encoded bytes, header included.
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes { &self.bytes }

    /// Payload share carried after the header.
    #[must_use]
    pub fn payload(&self) -> Bytes { self.bytes.slice(self.header.header_len()..) }

    /// Consume the chunk, returning its encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes { self.bytes }
}

/// Ordered chunks produced for a single message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkBatch {
    message_id: MessageId,
    chunks: Vec<Chunk>,
}

impl ChunkBatch {
    fn new(message_id: MessageId, chunks: Vec<Chunk>) -> Self {
        debug_assert!(!chunks.is_empty(), "chunk batches must not be empty");
        Self { message_id, chunks }
    }

    /// Identifier shared by every chunk.
    #[must_use]
    pub const fn message_id(&self) -> MessageId { self.message_id }

    /// Chunks in write order.
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] { self.chunks.as_slice() }

    /// Number of chunks in the batch.
    #[expect(
        clippy::len_without_is_empty,
        reason = "batches are guaranteed non-empty"
    )]
    #[must_use]
    pub fn len(&self) -> usize { self.chunks.len() }

    /// Total encoded bytes, headers included.
    #[must_use]
    pub fn wire_len(&self) -> usize { self.chunks.iter().map(|chunk| chunk.bytes.len()).sum() }

    /// Consume the batch, returning the chunks in write order.
    #[must_use]
    pub fn into_chunks(self) -> Vec<Chunk> { self.chunks }
}

impl IntoIterator for ChunkBatch {
    type Item = Chunk;
    type IntoIter = std::vec::IntoIter<Chunk>;

    fn into_iter(self) -> Self::IntoIter { self.chunks.into_iter() }
}
