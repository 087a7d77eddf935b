//! Detection of XML-RPC and JSON-RPC calls in request bodies

use std::fmt;

use once_cell::sync::Lazy;
use regex::bytes::Regex;

static XML_RPC_METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<methodName>(.*?)</methodName>").expect("static regex must compile")
});

static JSON_RPC_METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""method"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("static regex must compile")
});

/// RPC call found in a request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcCall {
    /// `<methodName>` of an XML-RPC `<methodCall>`
    Xml(String),
    /// `"method"` member of a JSON-RPC request
    Json(String),
}

impl RpcCall {
    /// Name of the called method
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Xml(method) | Self::Json(method) => method,
        }
    }
}

impl fmt::Display for RpcCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml(method) => write!(f, "XmlRpc - {method}"),
            Self::Json(method) => write!(f, "jsonRpc - {method}"),
        }
    }
}

/// Find the RPC method called by `body`
///
/// XML-RPC is checked first, a body carrying both shapes reports the XML one.
#[must_use]
pub fn detect(body: &[u8]) -> Option<RpcCall> {
    if let Some(captures) = XML_RPC_METHOD.captures(body) {
        return Some(RpcCall::Xml(
            String::from_utf8_lossy(&captures[1]).into_owned(),
        ));
    }

    JSON_RPC_METHOD
        .captures(body)
        .map(|captures| RpcCall::Json(String::from_utf8_lossy(&captures[1]).into_owned()))
}

/// Exact XML-RPC method element, used when matching bodies
#[must_use]
pub fn xml_method_element(method: &str) -> Vec<u8> {
    format!("<methodName>{method}</methodName>").into_bytes()
}

/// Whether `body` is a JSON-RPC request (or batch) calling `method`
#[must_use]
pub fn is_json_call(body: &[u8], method: &str) -> bool {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };

    let calls = |value: &serde_json::Value| {
        value.get("method").and_then(serde_json::Value::as_str) == Some(method)
    };

    match &value {
        serde_json::Value::Array(batch) => batch.iter().any(calls),
        other => calls(other),
    }
}
