//! Message payload envelope shared by requests and responses.
//!
//! A reassembled message payload is `[headerLength:u32][header][body]`. The
//! header document is bincode-encoded; the body is opaque. Only the leading
//! length word is needed to locate the body, which is what [`BodyCodec`]
//! exposes to the connection.

use bincode::{
    Decode,
    Encode,
    config,
    decode_from_slice,
    encode_to_vec,
    error::{DecodeError, EncodeError},
};
use thiserror::Error;

use crate::byte_order::{read_wire_u32_at, write_wire_u32};

/// Bytes occupied by the header length prefix.
pub const HEADER_PREFIX_LEN: usize = 4;
/// Envelope format version written into every header document.
pub const ENVELOPE_VERSION: u8 = 1;
/// Largest header document accepted on decode. Length fields inside the
/// document that claim more than this fail instead of allocating.
pub const MAX_HEADER_DOC_LEN: usize = 1024 * 1024;

/// Kind of message carried by an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum MessageType {
    /// Client-to-server request.
    Request,
    /// Server-to-client response.
    Response,
}

/// Errors produced while building or parsing an envelope.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The header document could not be serialised.
    #[error("failed to encode message header: {0}")]
    Encode(#[from] EncodeError),
    /// The header document could not be parsed.
    #[error("failed to decode message header: {0}")]
    Decode(#[from] DecodeError),
    /// The payload is too short to hold the length prefix.
    #[error("message of {received} bytes has no header length prefix")]
    MissingLength {
        /// Bytes in the payload.
        received: usize,
    },
    /// The declared header extends past the received bytes.
    #[error("message declares {declared} header bytes but only {received} arrived")]
    Truncated {
        /// Bytes the prefix declares, prefix included.
        declared: usize,
        /// Bytes in the payload.
        received: usize,
    },
    /// The header document does not fill its declared length exactly.
    #[error("header document used {used} of {declared} declared bytes")]
    TrailingHeaderBytes {
        /// Bytes consumed by the decoder.
        used: usize,
        /// Bytes the prefix declares.
        declared: usize,
    },
    /// A header longer than the prefix can describe.
    #[error("header document of {0} bytes exceeds the prefix range")]
    HeaderTooLarge(usize),
    /// The envelope carries a different message kind.
    #[error("expected a {expected:?} message, found {found:?}")]
    UnexpectedType {
        /// Kind the caller asked for.
        expected: MessageType,
        /// Kind the header declares.
        found: MessageType,
    },
}

/// Body codec collaborator: reports the self-declared length of a payload's
/// leading header so the connection can validate a reassembled message.
pub trait BodyCodec: Send + Sync + 'static {
    /// Length in bytes of the leading header region, prefix included, or
    /// `None` if `leading` is too short to tell.
    fn declared_length(&self, leading: &[u8]) -> Option<usize>;
}

/// Default [`BodyCodec`] reading the `u32` header length prefix.
///
/// # Examples
///
/// ```
/// use vstream::message::{BodyCodec, LengthPrefixedHeader};
///
/// assert_eq!(LengthPrefixedHeader.declared_length(&[3, 0, 0, 0, 9, 9, 9]), Some(7));
/// assert_eq!(LengthPrefixedHeader.declared_length(&[3, 0]), None);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct LengthPrefixedHeader;

impl BodyCodec for LengthPrefixedHeader {
    fn declared_length(&self, leading: &[u8]) -> Option<usize> {
        let len = usize::try_from(read_wire_u32_at(leading, 0)?).ok()?;
        HEADER_PREFIX_LEN.checked_add(len)
    }
}

/// Serialise `header` and append `body` into one envelope.
///
/// # Errors
///
/// Returns [`MessageError::Encode`] if the header cannot be serialised or
/// [`MessageError::HeaderTooLarge`] if it does not fit the prefix.
pub fn encode_envelope<H: Encode>(header: &H, body: &[u8]) -> Result<Vec<u8>, MessageError> {
    let doc = encode_to_vec(header, config::standard())?;
    let len = u32::try_from(doc.len()).map_err(|_| MessageError::HeaderTooLarge(doc.len()))?;
    let mut out = Vec::with_capacity(HEADER_PREFIX_LEN + doc.len() + body.len());
    out.extend_from_slice(&write_wire_u32(len));
    out.extend_from_slice(&doc);
    out.extend_from_slice(body);
    Ok(out)
}

/// Split an envelope into its header document and body.
///
/// # Errors
///
/// Returns [`MessageError::MissingLength`] or [`MessageError::Truncated`]
/// when the declared header length disagrees with the received bytes.
pub fn split_envelope<'a>(
    payload: &'a [u8],
    codec: &dyn BodyCodec,
) -> Result<(&'a [u8], &'a [u8]), MessageError> {
    let declared = codec
        .declared_length(payload)
        .ok_or(MessageError::MissingLength {
            received: payload.len(),
        })?;
    if declared > payload.len() {
        return Err(MessageError::Truncated {
            declared,
            received: payload.len(),
        });
    }
    let (header, body) = payload.split_at(declared);
    Ok((&header[HEADER_PREFIX_LEN.min(header.len())..], body))
}

/// Decode a header document that must fill `doc` exactly.
///
/// Decoding is bounded by [`MAX_HEADER_DOC_LEN`], so a forged string or map
/// length is reported as an error rather than allocated.
///
/// # Errors
///
/// Returns [`MessageError::HeaderTooLarge`], [`MessageError::Decode`] or
/// [`MessageError::TrailingHeaderBytes`].
pub fn decode_header<H: Decode<()>>(doc: &[u8]) -> Result<H, MessageError> {
    if doc.len() > MAX_HEADER_DOC_LEN {
        return Err(MessageError::HeaderTooLarge(doc.len()));
    }
    let (header, used) = decode_from_slice(doc, bounded())?;
    if used != doc.len() {
        return Err(MessageError::TrailingHeaderBytes {
            used,
            declared: doc.len(),
        });
    }
    Ok(header)
}

/// Decode a header document after checking that it describes `expected`.
///
/// Every header starts with `(version, message_type)`, so the kind is known
/// before the kind-specific fields are parsed.
///
/// # Errors
///
/// Returns [`MessageError::UnexpectedType`] for the wrong kind, otherwise as
/// [`decode_header`].
pub(crate) fn decode_typed_header<H: Decode<()>>(
    doc: &[u8],
    expected: MessageType,
) -> Result<H, MessageError> {
    let ((_version, found), _): ((u8, MessageType), usize) = decode_from_slice(doc, bounded())?;
    expect_type(expected, found)?;
    decode_header(doc)
}

fn bounded() -> impl config::Config {
    config::standard().with_limit::<MAX_HEADER_DOC_LEN>()
}

/// Fail with [`MessageError::UnexpectedType`] unless `found` matches.
fn expect_type(expected: MessageType, found: MessageType) -> Result<(), MessageError> {
    if expected == found {
        Ok(())
    } else {
        Err(MessageError::UnexpectedType { expected, found })
    }
}
