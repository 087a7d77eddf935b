//! Snapshot of one inbound request

use bytes::Bytes;

use crate::rpc::{self, RpcCall};

/// An immutable snapshot of one inbound HTTP request
///
/// Header names are stored lower-cased. When the same header name appears
/// more than once only the first occurrence is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl RecordedRequest {
    /// Create a new recorded request
    pub fn new<I, K, V>(
        method: impl Into<String>,
        path: impl Into<String>,
        headers: I,
        body: impl Into<Bytes>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut kept: Vec<(String, String)> = Vec::new();
        for (name, value) in headers {
            let name = name.as_ref().to_ascii_lowercase();
            if kept.iter().any(|(existing, _)| *existing == name) {
                continue;
            }
            kept.push((name, value.into()));
        }

        Self {
            method: method.into(),
            path: path.into(),
            headers: kept,
            body: body.into(),
        }
    }

    /// HTTP method, e.g. `POST`
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Percent-decoded request path without the query string
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Headers in wire order
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Look up a header value, ignoring the case of `name`
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether a header is present, ignoring the case of `name`
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Raw request body
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the body contains `needle` as a contiguous byte sequence
    #[must_use]
    pub fn body_contains(&self, needle: impl AsRef<[u8]>) -> bool {
        let needle = needle.as_ref();
        if needle.is_empty() {
            return true;
        }
        self.body.windows(needle.len()).any(|window| window == needle)
    }

    /// RPC call detected in the body, if the request looks like one
    #[must_use]
    pub fn rpc_call(&self) -> Option<RpcCall> {
        rpc::detect(&self.body)
    }

    /// Short human-readable description used in log lines
    #[must_use]
    pub fn describe(&self) -> String {
        match self.rpc_call() {
            Some(call) => format!("{} - {call}", self.method),
            None => {
                let preview = &self.body[..self.body.len().min(10)];
                format!(
                    "{} to '{}' with body b\"{}\"",
                    self.method,
                    self.path,
                    preview.escape_ascii()
                )
            }
        }
    }
}
