//! Request predicates used by expectations

use serde::{Deserialize, Serialize};

use crate::request::RecordedRequest;
use crate::rpc;

/// Path XML-RPC calls are posted to, compared case-insensitively
pub const XML_RPC_PATH: &str = "/rpc2";

/// Decides whether an expectation claims a request
///
/// Implemented for any `Fn(&RecordedRequest) -> bool` closure, so ad-hoc
/// predicates can be registered directly.
pub trait Matcher: Send + Sync {
    /// Whether `request` is accepted
    fn matches(&self, request: &RecordedRequest) -> bool;

    /// Name used for an expectation registered without an explicit one
    fn describe(&self) -> Option<String> {
        None
    }
}

impl<F> Matcher for F
where
    F: Fn(&RecordedRequest) -> bool + Send + Sync,
{
    fn matches(&self, request: &RecordedRequest) -> bool {
        self(request)
    }
}

/// Declarative matcher; every field that is set must match
///
/// Also the `[[expectations]]` matcher section of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPattern {
    /// HTTP method, compared case-insensitively
    pub method: Option<String>,
    /// Exact request path
    pub path: Option<String>,
    /// Substring the body must contain
    pub body_contains: Option<String>,
    /// Header that must be present
    pub header: Option<String>,
    /// XML-RPC method name; also requires the `/RPC2` path
    pub xml_rpc: Option<String>,
    /// JSON-RPC method name
    pub json_rpc: Option<String>,
}

impl RequestPattern {
    /// Pattern that matches every request
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Require an HTTP method
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Require an exact path
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Require a body substring
    #[must_use]
    pub fn body_contains(mut self, needle: impl Into<String>) -> Self {
        self.body_contains = Some(needle.into());
        self
    }

    /// Require a header to be present
    #[must_use]
    pub fn header(mut self, name: impl Into<String>) -> Self {
        self.header = Some(name.into());
        self
    }

    /// Require an XML-RPC call of `method` posted to `/RPC2`
    #[must_use]
    pub fn xml_rpc(mut self, method: impl Into<String>) -> Self {
        self.xml_rpc = Some(method.into());
        self
    }

    /// Require a JSON-RPC call of `method`
    #[must_use]
    pub fn json_rpc(mut self, method: impl Into<String>) -> Self {
        self.json_rpc = Some(method.into());
        self
    }

    /// Whether no criterion is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Matcher for RequestPattern {
    fn matches(&self, request: &RecordedRequest) -> bool {
        if let Some(method) = &self.method {
            if !method.eq_ignore_ascii_case(request.method()) {
                return false;
            }
        }

        if let Some(path) = &self.path {
            if path != request.path() {
                return false;
            }
        }

        if let Some(needle) = &self.body_contains {
            if !request.body_contains(needle) {
                return false;
            }
        }

        if let Some(header) = &self.header {
            if !request.has_header(header) {
                return false;
            }
        }

        if let Some(method) = &self.xml_rpc {
            if !request.path().eq_ignore_ascii_case(XML_RPC_PATH)
                || !request.body_contains(rpc::xml_method_element(method))
            {
                return false;
            }
        }

        if let Some(method) = &self.json_rpc {
            if !rpc::is_json_call(request.body(), method) {
                return false;
            }
        }

        true
    }

    fn describe(&self) -> Option<String> {
        if let Some(method) = &self.xml_rpc {
            return Some(format!("XmlRpc: {method}"));
        }
        if let Some(method) = &self.json_rpc {
            return Some(format!("JsonRpc: {method}"));
        }

        match (&self.method, &self.path) {
            (Some(method), Some(path)) => Some(format!("{} {path}", method.to_uppercase())),
            (None, Some(path)) => Some(path.clone()),
            _ => self
                .body_contains
                .as_ref()
                .map(|needle| format!("body contains '{needle}'"))
                .or_else(|| self.header.as_ref().map(|name| format!("header '{name}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(path: &str, headers: Vec<(&str, &str)>, body: &str) -> RecordedRequest {
        RecordedRequest::new("POST", path, headers, body.to_string())
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        let pattern = RequestPattern::any();

        assert!(pattern.is_empty());
        assert!(pattern.matches(&post("/", vec![], "")));
        assert_eq!(pattern.describe(), None);
    }

    #[test]
    fn test_path_and_method() {
        let pattern = RequestPattern::any().method("post").path("/path");

        assert!(pattern.matches(&post("/path", vec![], "")));
        assert!(!pattern.matches(&post("/path/", vec![], "")));
        assert!(!pattern.matches(&RecordedRequest::new(
            "GET",
            "/path",
            Vec::<(String, String)>::new(),
            ""
        )));
        assert_eq!(pattern.describe().as_deref(), Some("POST /path"));
    }

    #[test]
    fn test_header_presence() {
        let pattern = RequestPattern::any().header("foo");

        assert!(pattern.matches(&post("/", vec![("Foo", "23")], "")));
        assert!(!pattern.matches(&post("/", vec![("bar", "42")], "")));
    }

    #[test]
    fn test_xml_rpc() {
        let pattern = RequestPattern::any().xml_rpc("any_method");
        let call = "<methodCall><methodName>any_method</methodName><params></params></methodCall>";

        assert!(pattern.matches(&post("/RPC2", vec![], call)));
        assert!(pattern.matches(&post("/rpc2", vec![], call)));
        assert!(!pattern.matches(&post("/other", vec![], call)));
        assert!(!pattern.matches(&post(
            "/RPC2",
            vec![],
            "<methodCall><methodName>another_method</methodName></methodCall>"
        )));
        assert!(!pattern.matches(&post(
            "/RPC2",
            vec![],
            "<methodCall>any_method<params></params></methodCall>"
        )));
        assert_eq!(pattern.describe().as_deref(), Some("XmlRpc: any_method"));
    }

    #[test]
    fn test_json_rpc() {
        let pattern = RequestPattern::any().json_rpc("cron");

        assert!(pattern.matches(&post("/", vec![], r#"{"jsonrpc":"2.0","method":"cron","id":7}"#)));
        assert!(!pattern.matches(&post("/", vec![], r#"{"method":"other"}"#)));
    }

    #[test]
    fn test_closure_matcher() {
        let matcher = |request: &RecordedRequest| request.body_contains("foo");

        assert!(matcher.matches(&post("/", vec![], "foo")));
        assert_eq!(Matcher::describe(&matcher), None);
    }
}
