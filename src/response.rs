//! Inbound response model.

use std::collections::BTreeMap;

use bincode::{Decode, Encode};
use bytes::Bytes;

use crate::{
    chunk::MessageId,
    message::{
        BodyCodec,
        ENVELOPE_VERSION,
        MessageError,
        MessageType,
        decode_typed_header,
        encode_envelope,
        split_envelope,
    },
};

#[derive(Debug, Encode, Decode)]
struct ResponseHeader {
    version: u8,
    message_type: MessageType,
    status_code: u16,
    meta: BTreeMap<String, String>,
}

/// Response matched to a request by message id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    message_id: MessageId,
    status_code: u16,
    meta: BTreeMap<String, String>,
    body: Bytes,
}

impl Response {
    /// Create an empty response with `status_code`. Peers use this to answer
    /// requests; clients receive decoded instances.
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        Self {
            message_id: MessageId::new(0),
            status_code,
            meta: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// Add a meta header, replacing any previous value.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Attach an opaque body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Identifier of the message that carried this response.
    #[must_use]
    pub const fn message_id(&self) -> MessageId { self.message_id }

    /// HTTP-style status code reported by the server.
    #[must_use]
    pub const fn status_code(&self) -> u16 { self.status_code }

    /// Meta headers, sorted by key.
    #[must_use]
    pub fn meta(&self) -> &BTreeMap<String, String> { &self.meta }

    /// Opaque response body.
    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }

    /// Consume the response, returning its body.
    #[must_use]
    pub fn into_body(self) -> Bytes { self.body }

    /// Whether the status code is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool { matches!(self.status_code, 200..=299) }

    /// Serialise the response into a message payload. The message id travels
    /// in the chunk headers, not here.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] if the header cannot be encoded.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let header = ResponseHeader {
            version: ENVELOPE_VERSION,
            message_type: MessageType::Response,
            status_code: self.status_code,
            meta: self.meta.clone(),
        };
        encode_envelope(&header, &self.body)
    }

    /// Parse a reassembled response payload received as `message_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] if the envelope is malformed or carries a
    /// request.
    pub fn decode(
        message_id: MessageId,
        payload: &Bytes,
        codec: &dyn BodyCodec,
    ) -> Result<Self, MessageError> {
        let (doc, body) = split_envelope(payload, codec)?;
        let header: ResponseHeader = decode_typed_header(doc, MessageType::Response)?;
        Ok(Self {
            message_id,
            status_code: header.status_code,
            meta: header.meta,
            body: payload.slice(payload.len() - body.len()..),
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;

    use super::Response;
    use crate::{
        chunk::MessageId,
        message::{LengthPrefixedHeader, MessageError},
        request::{RestVerb, create_request},
    };

    #[test]
    fn decoded_response_carries_message_id() {
        let sent = Response::new(201)
            .with_meta("etag", "\"17\"")
            .with_body(&b"{}"[..]);
        let payload = Bytes::from(sent.encode().expect("encodes"));

        let received =
            Response::decode(MessageId::new(9), &payload, &LengthPrefixedHeader).expect("decodes");
        assert_eq!(received.message_id(), MessageId::new(9));
        assert_eq!(received.status_code(), 201);
        assert_eq!(received.meta()["etag"], "\"17\"");
        assert_eq!(received.body().as_ref(), b"{}");
    }

    #[rstest]
    #[case(200, true)]
    #[case(299, true)]
    #[case(304, false)]
    #[case(500, false)]
    fn success_is_the_2xx_range(#[case] status: u16, #[case] success: bool) {
        assert_eq!(Response::new(status).is_success(), success);
    }

    #[test]
    fn request_payload_is_not_a_response() {
        let payload = Bytes::from(
            create_request(RestVerb::Get, "/_api/version")
                .encode()
                .expect("encodes"),
        );
        assert!(matches!(
            Response::decode(MessageId::new(1), &payload, &LengthPrefixedHeader),
            Err(MessageError::UnexpectedType { .. })
        ));
    }
}
