//! Tokio codec splitting a byte stream into chunks.
//!
//! The decoder peeks each chunk's declared length before consuming anything,
//! so a partially buffered chunk simply waits for more input. A declared
//! length that cannot be valid is reported immediately; the stream offers no
//! way to resynchronise after that.

use std::io;

use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::{Chunk, ChunkError, HeaderCodec, is_chunk_complete, peek_chunk_length};

/// Errors raised while framing chunks on a byte stream.
#[derive(Debug, Error)]
pub enum ChunkCodecError {
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// A chunk header is malformed.
    #[error("malformed chunk: {0}")]
    Chunk(#[from] ChunkError),
    /// The stream ended part-way through a chunk.
    #[error("stream ended with {buffered} bytes of an incomplete chunk")]
    UnexpectedEof {
        /// Bytes left in the buffer.
        buffered: usize,
    },
}

/// Decoder and encoder for wire chunks.
#[derive(Clone, Copy, Debug)]
pub struct ChunkCodec {
    header: HeaderCodec,
}

impl ChunkCodec {
    /// Create a codec using `header` for layout and length validation.
    #[must_use]
    pub const fn new(header: HeaderCodec) -> Self { Self { header } }

    /// Header codec in use.
    #[must_use]
    pub const fn header_codec(&self) -> &HeaderCodec { &self.header }
}

impl Decoder for ChunkCodec {
    type Item = Chunk;
    type Error = ChunkCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((declared, header_len)) = peek_chunk_length(src) else {
            return Ok(None);
        };
        self.header.check_length(declared, header_len)?;

        let Some(len) = is_chunk_complete(src) else {
            src.reserve((declared as usize).saturating_sub(src.len()));
            return Ok(None);
        };
        let bytes = src.split_to(len).freeze();
        let (header, _) = self.header.decode(&bytes)?;
        Ok(Some(Chunk::new(header, bytes)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(chunk) => Ok(Some(chunk)),
            None => Err(ChunkCodecError::UnexpectedEof {
                buffered: src.len(),
            }),
        }
    }
}

impl Encoder<Chunk> for ChunkCodec {
    type Error = ChunkCodecError;

    fn encode(&mut self, item: Chunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}
