//! Canned responses served by expectations

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::StatusCode;

/// Content type used for text payloads
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Content type used for raw byte payloads
pub const BYTES_CONTENT_TYPE: &str = "application/octet-stream";

/// One response value of a response sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CannedResponse {
    /// Text payload served with status 200
    Text(String),
    /// Raw payload served with status 200
    Bytes(Bytes),
    /// Complete response served verbatim
    Full(FullResponse),
}

impl CannedResponse {
    /// Turn the value into the response that goes on the wire
    ///
    /// Plain payloads get status 200 and a content type matching their kind;
    /// full responses are returned unmodified.
    #[must_use]
    pub fn into_full(self) -> FullResponse {
        match self {
            Self::Text(text) => FullResponse::new(StatusCode::OK)
                .with_content_type(HeaderValue::from_static(TEXT_CONTENT_TYPE))
                .with_body(text),
            Self::Bytes(bytes) => FullResponse::new(StatusCode::OK)
                .with_content_type(HeaderValue::from_static(BYTES_CONTENT_TYPE))
                .with_body(bytes),
            Self::Full(full) => full,
        }
    }
}

impl From<&str> for CannedResponse {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for CannedResponse {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&[u8]> for CannedResponse {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl<const N: usize> From<&[u8; N]> for CannedResponse {
    fn from(bytes: &[u8; N]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<Vec<u8>> for CannedResponse {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for CannedResponse {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<FullResponse> for CannedResponse {
    fn from(full: FullResponse) -> Self {
        Self::Full(full)
    }
}

/// A complete response descriptor: status, headers and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl FullResponse {
    /// Create an empty response with the given status
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the `Content-Type` header, replacing any previous value
    #[must_use]
    pub fn with_content_type(mut self, value: HeaderValue) -> Self {
        self.headers.insert(CONTENT_TYPE, value);
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `Content-Type` header, if set and valid UTF-8
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Response body
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Split into status, headers and body
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}
