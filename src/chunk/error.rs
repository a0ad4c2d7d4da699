//! Error types emitted by the chunk layer.
//!
//! Header and framing problems are split from reassembly problems so the
//! connection can tell a corrupt byte stream (fatal) apart from a chunk that
//! merely references a message it no longer tracks (dropped).

use thiserror::Error;

use super::{ChunkIndex, MessageId};

/// Errors produced while encoding or decoding a chunk header.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    /// Fewer bytes were supplied than the header layout requires.
    #[error("truncated chunk header: have {have} bytes, need {need}")]
    Truncated {
        /// Bytes available in the buffer.
        have: usize,
        /// Bytes required for the header.
        need: usize,
    },
    /// The declared chunk length cannot even hold its own header.
    #[error("chunk length {length} is shorter than its {header_len} byte header")]
    LengthBelowHeader {
        /// Declared chunk length.
        length: u32,
        /// Size of the header layout the flags select.
        header_len: usize,
    },
    /// The declared chunk length exceeds the configured maximum.
    #[error("chunk length {length} exceeds the {max} byte limit")]
    LengthAboveMaximum {
        /// Declared chunk length.
        length: u32,
        /// Configured maximum chunk length.
        max: usize,
    },
    /// A first chunk announced zero chunks for its message.
    #[error("first chunk of message {message_id} declares zero chunks")]
    ZeroChunkCount {
        /// Message the chunk belongs to.
        message_id: MessageId,
    },
    /// A first chunk carries more payload than its whole message.
    #[error("first chunk of message {message_id} carries {payload} bytes of a {message_length} byte message")]
    PayloadExceedsMessage {
        /// Message the chunk belongs to.
        message_id: MessageId,
        /// Payload bytes in the chunk.
        payload: usize,
        /// Declared total message length.
        message_length: u64,
    },
    /// A count or index does not fit in the bits the protocol version allots.
    #[error("chunk count or index {value} exceeds the protocol maximum {max}")]
    FieldOverflow {
        /// Value that was to be encoded.
        value: u32,
        /// Largest encodable value.
        max: u32,
    },
}

/// Errors produced while splitting an outbound message.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// The message would need more chunks than the header can describe.
    #[error("message needs {required} chunks but at most {max} are encodable")]
    TooManyChunks {
        /// Chunks the payload requires.
        required: usize,
        /// Largest chunk count the protocol version can express.
        max: u32,
    },
    /// The message exceeds the configured maximum message size.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge {
        /// Payload size.
        size: usize,
        /// Configured maximum message size.
        limit: usize,
    },
    /// A chunk header could not be encoded.
    #[error(transparent)]
    Header(#[from] ChunkError),
}

/// Errors produced while reassembling inbound chunks.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    /// The chunk header could not be decoded.
    #[error(transparent)]
    Header(#[from] ChunkError),
    /// A first chunk declared a message larger than the configured cap.
    #[error("message {message_id} declares {declared} bytes, limit is {limit}")]
    MessageTooLarge {
        /// Message the chunk belongs to.
        message_id: MessageId,
        /// Declared total message length.
        declared: u64,
        /// Configured maximum message size.
        limit: usize,
    },
    /// A continuation chunk arrived for a message with no open buffer.
    #[error("orphan chunk {index} for unknown message {message_id}")]
    UnknownMessage {
        /// Identifier the chunk references.
        message_id: MessageId,
        /// Index the chunk claims.
        index: ChunkIndex,
    },
    /// A chunk index lies outside the count announced by the first chunk.
    #[error("chunk {index} of message {message_id} is outside its {expected} chunk count")]
    IndexOutOfRange {
        /// Message the chunk belongs to.
        message_id: MessageId,
        /// Index the chunk claims.
        index: ChunkIndex,
        /// Chunk count announced by the first chunk.
        expected: u32,
    },
    /// A chunk index was already received for this message.
    #[error("duplicate chunk {index} for message {message_id}")]
    DuplicateChunk {
        /// Message the chunk belongs to.
        message_id: MessageId,
        /// Repeated index.
        index: ChunkIndex,
    },
    /// Accepting the chunk would grow the message past its declared length.
    #[error("message {message_id} would grow to {attempted} bytes, declared {expected}")]
    LengthOverflow {
        /// Message the chunk belongs to.
        message_id: MessageId,
        /// Declared total message length.
        expected: u64,
        /// Length the message would reach.
        attempted: u64,
    },
    /// Every announced chunk arrived but the byte total disagrees.
    #[error("message {message_id} completed with {received} bytes, declared {expected}")]
    LengthMismatch {
        /// Message the chunk belongs to.
        message_id: MessageId,
        /// Declared total message length.
        expected: u64,
        /// Bytes actually received.
        received: u64,
    },
}

impl ReassemblyError {
    /// Whether the byte stream can no longer be parsed safely.
    ///
    /// Fatal errors close the connection; everything else is confined to the
    /// message the chunk references.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Header(_) | Self::MessageTooLarge { .. })
    }

    /// Message whose partial buffer was discarded because of this error.
    ///
    /// Callers waiting on that message will never see it complete.
    #[must_use]
    pub const fn aborted_message(&self) -> Option<MessageId> {
        match self {
            Self::IndexOutOfRange { message_id, .. }
            | Self::LengthOverflow { message_id, .. }
            | Self::LengthMismatch { message_id, .. } => Some(*message_id),
            Self::Header(_)
            | Self::MessageTooLarge { .. }
            | Self::UnknownMessage { .. }
            | Self::DuplicateChunk { .. } => None,
        }
    }
}
