#![doc(html_root_url = "https://docs.rs/vstream/latest")]
//! Client transport for a chunked, multiplexed binary request/response
//! protocol.
//!
//! Requests are serialised into a small envelope, split into length-prefixed
//! chunks and written over one persistent byte stream. Responses arriving in
//! any order are reassembled and matched back to their requests by message
//! id, so many callers can share a single [`Connection`].
//!
//! ```no_run
//! use vstream::{Connection, RestVerb, create_request};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), vstream::Error> {
//! let connection = Connection::builder().connect("127.0.0.1:8529").await?;
//! let response = connection
//!     .send_request(create_request(RestVerb::Get, "/_api/version"))
//!     .await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```

pub mod byte_order;
pub mod chunk;
pub mod connection;
pub mod error;
pub mod message;
pub mod metrics;
pub mod preamble;
pub mod request;
pub mod response;

pub use chunk::{
    Chunk,
    ChunkBatch,
    ChunkCodec,
    ChunkConfig,
    ChunkHeader,
    Chunker,
    HeaderCodec,
    MessageId,
    ProtocolVersion,
    ReassembledMessage,
    Reassembler,
    ReassemblyError,
};
pub use connection::{Connection, ConnectionBuilder, ConnectionConfig, ConnectionState};
pub use error::{Error, ErrorCode, Result};
pub use message::{BodyCodec, LengthPrefixedHeader, MessageError};
pub use request::{Request, RestVerb, create_request};
pub use response::Response;
