//! Outbound request model.
//!
//! A [`Request`] names a REST verb, a database-relative path, optional query
//! parameters and meta headers, and an opaque body. It is serialised into a
//! message envelope (see [`crate::message`]) before chunking.

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use bincode::{Decode, Encode};
use bytes::Bytes;
use thiserror::Error;

use crate::message::{
    BodyCodec,
    ENVELOPE_VERSION,
    MessageError,
    MessageType,
    decode_typed_header,
    encode_envelope,
    split_envelope,
};

/// Database addressed when a request does not name one.
pub const DEFAULT_DATABASE: &str = "_system";

/// REST verb carried by a request.
///
/// The variant order fixes the wire numbering: `Delete` is 0 and `Options` 6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum RestVerb {
    Delete,
    Get,
    Post,
    Put,
    Head,
    Patch,
    Options,
}

impl RestVerb {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for RestVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error returned when parsing an unrecognised verb name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown REST verb `{0}`")]
pub struct UnknownVerb(pub String);

impl FromStr for RestVerb {
    type Err = UnknownVerb;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [RestVerb; 7] = [
            RestVerb::Delete,
            RestVerb::Get,
            RestVerb::Post,
            RestVerb::Put,
            RestVerb::Head,
            RestVerb::Patch,
            RestVerb::Options,
        ];
        ALL.into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVerb(s.to_owned()))
    }
}

#[derive(Debug, Encode, Decode)]
struct RequestHeader {
    version: u8,
    message_type: MessageType,
    database: String,
    verb: RestVerb,
    path: String,
    parameters: BTreeMap<String, String>,
    meta: BTreeMap<String, String>,
}

/// A request ready to be sent over a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    verb: RestVerb,
    path: String,
    database: String,
    parameters: BTreeMap<String, String>,
    meta: BTreeMap<String, String>,
    body: Bytes,
    timeout: Option<Duration>,
}

/// Build a request for `verb` on `path` with an empty body.
///
/// # Examples
///
/// ```
/// use vstream::{RestVerb, create_request};
///
/// let request = create_request(RestVerb::Get, "/_api/version").with_parameter("details", "true");
/// assert_eq!(request.verb(), RestVerb::Get);
/// assert_eq!(request.parameters()["details"], "true");
/// ```
#[must_use]
pub fn create_request(verb: RestVerb, path: impl Into<String>) -> Request { Request::new(verb, path) }

impl Request {
    /// Create a request addressed to [`DEFAULT_DATABASE`].
    #[must_use]
    pub fn new(verb: RestVerb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            database: DEFAULT_DATABASE.to_owned(),
            parameters: BTreeMap::new(),
            meta: BTreeMap::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    /// Address a different database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Add a query parameter, replacing any previous value.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
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

    /// Override the connection's default request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// REST verb the server dispatches on.
    #[must_use]
    pub const fn verb(&self) -> RestVerb { self.verb }

    /// Request path, without query string.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Database the request is addressed to.
    #[must_use]
    pub fn database(&self) -> &str { &self.database }

    /// Query parameters, sorted by key.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, String> { &self.parameters }

    /// Meta headers, sorted by key.
    #[must_use]
    pub fn meta(&self) -> &BTreeMap<String, String> { &self.meta }

    /// Opaque request body.
    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }

    /// Per-request timeout override, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> { self.timeout }

    /// Serialise the request into a message payload.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] if the header cannot be encoded.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let header = RequestHeader {
            version: ENVELOPE_VERSION,
            message_type: MessageType::Request,
            database: self.database.clone(),
            verb: self.verb,
            path: self.path.clone(),
            parameters: self.parameters.clone(),
            meta: self.meta.clone(),
        };
        encode_envelope(&header, &self.body)
    }

    /// Parse a request payload, as a server or test peer would.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] if the envelope is malformed or carries a
    /// response.
    pub fn decode(payload: &Bytes, codec: &dyn BodyCodec) -> Result<Self, MessageError> {
        let (doc, body) = split_envelope(payload, codec)?;
        let header: RequestHeader = decode_typed_header(doc, MessageType::Request)?;
        let body = payload.slice(payload.len() - body.len()..);
        Ok(Self {
            verb: header.verb,
            path: header.path,
            database: header.database,
            parameters: header.parameters,
            meta: header.meta,
            body,
            timeout: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;

    use super::{RestVerb, create_request};
    use crate::message::{LengthPrefixedHeader, MessageError};

    #[rstest]
    #[case("get", RestVerb::Get)]
    #[case("DELETE", RestVerb::Delete)]
    #[case("Options", RestVerb::Options)]
    fn verbs_parse_case_insensitively(#[case] name: &str, #[case] verb: RestVerb) {
        assert_eq!(name.parse::<RestVerb>(), Ok(verb));
    }

    #[test]
    fn unknown_verb_is_rejected() { assert!("FETCH".parse::<RestVerb>().is_err()); }

    #[test]
    fn request_survives_the_envelope() {
        let request = create_request(RestVerb::Post, "/_api/cursor")
            .with_database("orders")
            .with_parameter("batch", "10")
            .with_meta("content-type", "application/json")
            .with_body(&b"{\"query\":\"RETURN 1\"}"[..]);

        let payload = Bytes::from(request.encode().expect("encodes"));
        let decoded = super::Request::decode(&payload, &LengthPrefixedHeader).expect("decodes");
        assert_eq!(decoded, request);
    }

    #[test]
    fn response_payload_is_not_a_request() {
        let payload = Bytes::from(crate::Response::new(200).encode().expect("encodes"));
        assert!(matches!(
            super::Request::decode(&payload, &LengthPrefixedHeader),
            Err(MessageError::UnexpectedType { .. })
        ));
    }
}
