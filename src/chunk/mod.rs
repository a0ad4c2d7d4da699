//! Chunk framing: header codec, outbound chunker and inbound reassembler.
//!
//! Each sub-module focuses on one concept; the common types are re-exported
//! here so callers rarely need the sub-module paths.

pub mod chunker;
pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod id;
pub mod index;
pub mod reassembler;

pub use chunker::{Chunk, ChunkBatch, Chunker};
pub use codec::{ChunkCodec, ChunkCodecError};
pub use config::ChunkConfig;
pub use error::{ChunkError, ChunkingError, ReassemblyError};
pub use header::{
    CONTINUATION_HEADER_LEN,
    ChunkHeader,
    ChunkKind,
    FIRST_HEADER_LEN,
    HeaderCodec,
    ProtocolVersion,
    is_chunk_complete,
    peek_chunk_length,
};
pub use id::MessageId;
pub use index::ChunkIndex;
pub use reassembler::{ReassembledMessage, Reassembler};
