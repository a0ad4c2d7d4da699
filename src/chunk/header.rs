//! Binary chunk header layouts and their codec.
//!
//! Every chunk starts with `[chunkLength:u32][flags:u32][messageId:u64]`. The
//! first chunk of a message appends `[messageLength:u64]`. Bit 0 of `flags`
//! marks the first chunk; the remaining bits hold the total chunk count on a
//! first chunk and the 0-based chunk index otherwise.

use std::fmt;

use bytes::BufMut;

use super::{ChunkError, ChunkIndex, MessageId};
use crate::byte_order::{read_wire_u32_at, read_wire_u64_at, write_wire_u32, write_wire_u64};

/// Size of a first-chunk header in bytes.
pub const FIRST_HEADER_LEN: usize = 24;
/// Size of a continuation-chunk header in bytes.
pub const CONTINUATION_HEADER_LEN: usize = 16;
/// Bytes needed to learn a chunk's length and layout.
pub const PEEK_LEN: usize = 8;

const FIRST_CHUNK_BIT: u32 = 1;
const VST_1_0_FIELD_MAX: u32 = u32::MAX >> 1;
const VST_1_1_FIELD_MAX: u32 = 0x007F_FFFF;

/// Protocol sub-version negotiated once per connection.
///
/// Both versions share the header field set. They differ in how the flags
/// word packs its reserved bits: `VST/1.1` keeps the top byte reserved, so a
/// count or index must fit in 23 bits instead of 31.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// `VST/1.0`.
    V1_0,
    /// `VST/1.1`.
    #[default]
    V1_1,
}

impl ProtocolVersion {
    /// Largest chunk count or index the flags word can carry.
    #[must_use]
    pub const fn max_field_value(self) -> u32 {
        match self {
            Self::V1_0 => VST_1_0_FIELD_MAX,
            Self::V1_1 => VST_1_1_FIELD_MAX,
        }
    }

    fn pack_flags(self, value: u32, first: bool) -> Result<u32, ChunkError> {
        let max = self.max_field_value();
        if value > max {
            return Err(ChunkError::FieldOverflow { value, max });
        }
        Ok((value << 1) | u32::from(first))
    }

    fn unpack_flags(self, flags: u32) -> (bool, u32) {
        let first = flags & FIRST_CHUNK_BIT == FIRST_CHUNK_BIT;
        (first, (flags >> 1) & self.max_field_value())
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1_0 => f.write_str("VST/1.0"),
            Self::V1_1 => f.write_str("VST/1.1"),
        }
    }
}

/// Layout-specific header fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// First chunk of a message; establishes the reassembly buffer.
    First {
        /// Total number of chunks in the message.
        chunk_count: u32,
        /// Total byte length of the message across all chunks.
        message_length: u64,
    },
    /// Any later chunk of a message.
    Continuation {
        /// Position of this chunk within the message.
        index: ChunkIndex,
    },
}

/// Decoded per-chunk metadata.
///
/// # Examples
///
/// ```
/// use vstream::chunk::{ChunkHeader, MessageId};
/// let header = ChunkHeader::first(MessageId::new(7), 2, 40, 16);
/// assert!(header.is_first());
/// assert_eq!(header.header_len(), 24);
/// assert_eq!(header.payload_len(), 16);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkHeader {
    chunk_length: u32,
    message_id: MessageId,
    kind: ChunkKind,
}

impl ChunkHeader {
    /// Build a first-chunk header for a chunk carrying `payload_len` bytes.
    ///
    /// The chunk length saturates at `u32::MAX`; encoding rejects such
    /// headers through the maximum-length check.
    #[must_use]
    pub fn first(
        message_id: MessageId,
        chunk_count: u32,
        message_length: u64,
        payload_len: usize,
    ) -> Self {
        Self {
            chunk_length: chunk_length_for(FIRST_HEADER_LEN, payload_len),
            message_id,
            kind: ChunkKind::First {
                chunk_count,
                message_length,
            },
        }
    }

    /// Build a continuation header for a chunk carrying `payload_len` bytes.
    #[must_use]
    pub fn continuation(message_id: MessageId, index: ChunkIndex, payload_len: usize) -> Self {
        Self {
            chunk_length: chunk_length_for(CONTINUATION_HEADER_LEN, payload_len),
            message_id,
            kind: ChunkKind::Continuation { index },
        }
    }

    /// Total bytes in the chunk, header included.
    #[must_use]
    pub const fn chunk_length(&self) -> u32 { self.chunk_length }

    /// Message this chunk belongs to.
    #[must_use]
    pub const fn message_id(&self) -> MessageId { self.message_id }

    /// Layout-specific fields.
    #[must_use]
    pub const fn kind(&self) -> ChunkKind { self.kind }

    /// Whether this is the first chunk of its message.
    #[must_use]
    pub const fn is_first(&self) -> bool { matches!(self.kind, ChunkKind::First { .. }) }

    /// Position of the chunk within its message.
    #[must_use]
    pub const fn index(&self) -> ChunkIndex {
        match self.kind {
            ChunkKind::First { .. } => ChunkIndex::zero(),
            ChunkKind::Continuation { index } => index,
        }
    }

    /// Size of this header's layout in bytes.
    #[must_use]
    pub const fn header_len(&self) -> usize {
        if self.is_first() {
            FIRST_HEADER_LEN
        } else {
            CONTINUATION_HEADER_LEN
        }
    }

    /// Payload bytes following the header.
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        (self.chunk_length as usize).saturating_sub(self.header_len())
    }
}

fn chunk_length_for(header_len: usize, payload_len: usize) -> u32 {
    u32::try_from(header_len.saturating_add(payload_len)).unwrap_or(u32::MAX)
}

/// Report whether `buf` holds at least one complete chunk.
///
/// Returns the chunk's byte length when every byte it declares is buffered,
/// and `None` otherwise, including when not even the length and flags words
/// have arrived. Nothing is consumed.
///
/// # Examples
///
/// ```
/// use vstream::chunk::is_chunk_complete;
///
/// let mut buf = vec![20, 0, 0, 0, 0, 0, 0, 0];
/// assert_eq!(is_chunk_complete(&buf), None);
/// buf.resize(20, 0);
/// assert_eq!(is_chunk_complete(&buf), Some(20));
/// ```
#[must_use]
pub fn is_chunk_complete(buf: &[u8]) -> Option<usize> {
    let declared = usize::try_from(read_wire_u32_at(buf, 0)?).ok()?;
    let flags = read_wire_u32_at(buf, 4)?;
    let header_len = header_len_for_flags(flags);
    let needed = declared.max(header_len);
    (buf.len() >= needed).then_some(needed)
}

/// Peek the declared chunk length and header size without consuming input.
#[must_use]
pub fn peek_chunk_length(buf: &[u8]) -> Option<(u32, usize)> {
    let declared = read_wire_u32_at(buf, 0)?;
    let flags = read_wire_u32_at(buf, 4)?;
    Some((declared, header_len_for_flags(flags)))
}

const fn header_len_for_flags(flags: u32) -> usize {
    if flags & FIRST_CHUNK_BIT == FIRST_CHUNK_BIT {
        FIRST_HEADER_LEN
    } else {
        CONTINUATION_HEADER_LEN
    }
}

/// Encoder and decoder for chunk headers under one protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderCodec {
    version: ProtocolVersion,
    max_chunk_length: usize,
}

impl HeaderCodec {
    /// Create a codec that rejects chunks longer than `max_chunk_length`.
    #[must_use]
    pub const fn new(version: ProtocolVersion, max_chunk_length: usize) -> Self {
        Self {
            version,
            max_chunk_length,
        }
    }

    /// Protocol version this codec packs flags for.
    #[must_use]
    pub const fn version(&self) -> ProtocolVersion { self.version }

    /// Largest chunk length accepted on decode.
    #[must_use]
    pub const fn max_chunk_length(&self) -> usize { self.max_chunk_length }

    /// Encode a first-chunk header.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::FieldOverflow`] when `total_chunks` does not fit
    /// the version's flag bits, [`ChunkError::ZeroChunkCount`] for a zero
    /// count, or a length error when the chunk length does not fit `u32`.
    pub fn encode_first(
        &self,
        message_id: MessageId,
        total_chunks: u32,
        message_length: u64,
        payload_len: usize,
    ) -> Result<[u8; FIRST_HEADER_LEN], ChunkError> {
        let header = ChunkHeader::first(message_id, total_chunks, message_length, payload_len);
        let mut out = [0_u8; FIRST_HEADER_LEN];
        self.encode(&header, &mut out.as_mut_slice())?;
        Ok(out)
    }

    /// Encode a continuation header.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::FieldOverflow`] when `index` does not fit the
    /// version's flag bits or a length error when the chunk length does not
    /// fit `u32`.
    pub fn encode_continuation(
        &self,
        message_id: MessageId,
        index: ChunkIndex,
        payload_len: usize,
    ) -> Result<[u8; CONTINUATION_HEADER_LEN], ChunkError> {
        let header = ChunkHeader::continuation(message_id, index, payload_len);
        let mut out = [0_u8; CONTINUATION_HEADER_LEN];
        self.encode(&header, &mut out.as_mut_slice())?;
        Ok(out)
    }

    /// Write `header` into `dst`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChunkError`] if a field cannot be represented.
    pub fn encode(&self, header: &ChunkHeader, dst: &mut impl BufMut) -> Result<(), ChunkError> {
        if header.chunk_length == u32::MAX {
            return Err(ChunkError::LengthAboveMaximum {
                length: header.chunk_length,
                max: u32::MAX as usize - 1,
            });
        }
        let flags = match header.kind {
            ChunkKind::First { chunk_count, .. } => {
                if chunk_count == 0 {
                    return Err(ChunkError::ZeroChunkCount {
                        message_id: header.message_id,
                    });
                }
                self.version.pack_flags(chunk_count, true)?
            }
            ChunkKind::Continuation { index } => self.version.pack_flags(index.get(), false)?,
        };
        dst.put_slice(&write_wire_u32(header.chunk_length));
        dst.put_slice(&write_wire_u32(flags));
        dst.put_slice(&write_wire_u64(header.message_id.get()));
        if let ChunkKind::First { message_length, .. } = header.kind {
            dst.put_slice(&write_wire_u64(message_length));
        }
        Ok(())
    }

    /// Decode the header at the start of `buf`.
    ///
    /// Only the header bytes need to be present; the payload is not read.
    /// Returns the header and the number of header bytes it occupies.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError`] when the buffer is too short for the header or
    /// when the declared length or counts are inconsistent.
    pub fn decode(&self, buf: &[u8]) -> Result<(ChunkHeader, usize), ChunkError> {
        let truncated = |need| ChunkError::Truncated {
            have: buf.len(),
            need,
        };
        let (Some(chunk_length), Some(flags)) = (read_wire_u32_at(buf, 0), read_wire_u32_at(buf, 4))
        else {
            return Err(truncated(PEEK_LEN));
        };
        let header_len = header_len_for_flags(flags);
        let message_id = read_wire_u64_at(buf, 8)
            .map(MessageId::new)
            .ok_or_else(|| truncated(header_len))?;
        self.check_length(chunk_length, header_len)?;

        let (first, value) = self.version.unpack_flags(flags);
        let kind = if first {
            let message_length = read_wire_u64_at(buf, 16).ok_or_else(|| truncated(header_len))?;
            if value == 0 {
                return Err(ChunkError::ZeroChunkCount { message_id });
            }
            let payload = chunk_length as usize - header_len;
            if payload as u64 > message_length {
                return Err(ChunkError::PayloadExceedsMessage {
                    message_id,
                    payload,
                    message_length,
                });
            }
            ChunkKind::First {
                chunk_count: value,
                message_length,
            }
        } else {
            ChunkKind::Continuation {
                index: ChunkIndex::new(value),
            }
        };

        Ok((
            ChunkHeader {
                chunk_length,
                message_id,
                kind,
            },
            header_len,
        ))
    }

    /// Validate a peeked chunk length against the header size and maximum.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::LengthBelowHeader`] or
    /// [`ChunkError::LengthAboveMaximum`].
    pub fn check_length(&self, chunk_length: u32, header_len: usize) -> Result<(), ChunkError> {
        let length = chunk_length as usize;
        if length < header_len {
            return Err(ChunkError::LengthBelowHeader {
                length: chunk_length,
                header_len,
            });
        }
        if length > self.max_chunk_length {
            return Err(ChunkError::LengthAboveMaximum {
                length: chunk_length,
                max: self.max_chunk_length,
            });
        }
        Ok(())
    }
}
