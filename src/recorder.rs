//! Dispatch of inbound requests to registered expectations

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use hyper::StatusCode;

use crate::expectation::{ExpectOptions, Expectation, ResponseSource, DEFAULT_WAIT_TIMEOUT};
use crate::log::{RecorderLog, TracingLog};
use crate::matcher::{Matcher, RequestPattern};
use crate::request::RecordedRequest;
use crate::response::{CannedResponse, FullResponse};
use crate::{RecorderError, Result};

/// Outcome of dispatching one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Exactly one expectation answered
    Respond(CannedResponse),
    /// No expectation answered; the request was recorded as unexpected
    NotFound,
}

impl Reply {
    /// Response to put on the wire
    #[must_use]
    pub fn into_full(self) -> FullResponse {
        match self {
            Self::Respond(response) => response.into_full(),
            Self::NotFound => FullResponse::new(StatusCode::NOT_FOUND),
        }
    }
}

/// Records inbound requests and answers them from registered expectations
pub struct Recorder {
    name: String,
    default_timeout: Duration,
    expectations: RwLock<Vec<Arc<Expectation>>>,
    unexpected: Mutex<Vec<RecordedRequest>>,
    next_id: AtomicUsize,
    log: Arc<dyn RecorderLog>,
}

impl Recorder {
    /// Create a recorder that logs through `tracing`
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_log(name, Arc::new(TracingLog))
    }

    /// Create a recorder with its own log sink
    pub fn with_log(name: impl Into<String>, log: Arc<dyn RecorderLog>) -> Self {
        Self {
            name: name.into(),
            default_timeout: DEFAULT_WAIT_TIMEOUT,
            expectations: RwLock::new(Vec::new()),
            unexpected: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
            log,
        }
    }

    /// Use `timeout` for expectations registered without one
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Recorder name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an expectation named after its matcher
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponseSource` if `responses` cannot form a cycle
    pub fn expect<M>(&self, matcher: M, responses: impl Into<ResponseSource>) -> Result<Arc<Expectation>>
    where
        M: Matcher + 'static,
    {
        self.expect_with(matcher, responses, ExpectOptions::default())
    }

    /// Register an expectation with explicit options
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponseSource` if `responses` cannot form a cycle
    pub fn expect_with<M>(
        &self,
        matcher: M,
        responses: impl Into<ResponseSource>,
        options: ExpectOptions,
    ) -> Result<Arc<Expectation>>
    where
        M: Matcher + 'static,
    {
        let expectation = Arc::new(Expectation::new(
            self.next_id.fetch_add(1, Ordering::Relaxed),
            Box::new(matcher),
            responses.into(),
            options.name,
            options.timeout.unwrap_or(self.default_timeout),
        )?);

        self.expectations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&expectation));

        Ok(expectation)
    }

    /// Expect requests to exactly `path`
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponseSource` if `responses` cannot form a cycle
    pub fn expect_path(
        &self,
        path: impl Into<String>,
        responses: impl Into<ResponseSource>,
    ) -> Result<Arc<Expectation>> {
        self.expect(RequestPattern::any().path(path), responses)
    }

    /// Expect XML-RPC calls of `method` posted to `/RPC2`
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponseSource` if `responses` cannot form a cycle
    pub fn expect_xml_rpc(
        &self,
        method: impl Into<String>,
        responses: impl Into<ResponseSource>,
    ) -> Result<Arc<Expectation>> {
        self.expect(RequestPattern::any().xml_rpc(method), responses)
    }

    /// Expect JSON-RPC calls of `method` on any path
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponseSource` if `responses` cannot form a cycle
    pub fn expect_json_rpc(
        &self,
        method: impl Into<String>,
        responses: impl Into<ResponseSource>,
    ) -> Result<Arc<Expectation>> {
        self.expect(RequestPattern::any().json_rpc(method), responses)
    }

    /// Dispatch one inbound request
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousMatch` if more than one expectation accepts the
    /// request; nothing is recorded in that case
    pub fn handle(&self, request: RecordedRequest) -> Result<Reply> {
        let description = request.describe();
        self.log.info(&format!("{self} got {description}"));

        let matches: Vec<Arc<Expectation>> = self
            .read_expectations()
            .iter()
            .filter(|expectation| expectation.can_respond(&request))
            .cloned()
            .collect();

        match matches.as_slice() {
            [] => {}
            [expectation] => {
                if let Some(response) = expectation.record_once(request.body().clone()) {
                    return Ok(Reply::Respond(response));
                }
            }
            _ => {
                return Err(RecorderError::AmbiguousMatch {
                    recorder: self.to_string(),
                    expectations: matches.iter().map(ToString::to_string).collect(),
                });
            }
        }

        self.log.warn(&format!("{self} got unexpected {description}"));
        self.unexpected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Ok(Reply::NotFound)
    }

    /// Registered expectations, in registration order
    pub fn expectations(&self) -> Vec<Arc<Expectation>> {
        self.read_expectations().clone()
    }

    /// Finite expectations that still have responses left, in registration order
    pub fn unsatisfied_expectations(&self) -> Vec<Arc<Expectation>> {
        self.read_expectations()
            .iter()
            .filter(|expectation| expectation.is_still_expecting())
            .cloned()
            .collect()
    }

    /// Requests no expectation answered, in arrival order
    pub fn unexpected_requests(&self) -> Vec<RecordedRequest> {
        self.unexpected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Warn about unsatisfied expectations, if there are any
    ///
    /// Called when the recorder's server shuts down.
    pub fn report_unsatisfied(&self) {
        let unsatisfied = self.unsatisfied_expectations();
        if unsatisfied.is_empty() {
            return;
        }

        let names: Vec<String> = unsatisfied.iter().map(ToString::to_string).collect();
        self.log.warn(&format!(
            "{self} is exiting but there are unsatisfied expectations: [{}]",
            names.join(", ")
        ));
    }

    fn read_expectations(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Expectation>>> {
        self.expectations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recorder '{}'", self.name)
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("name", &self.name)
            .field("default_timeout", &self.default_timeout)
            .field("expectations", &*self.read_expectations())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogLevel, MemoryLog};
    use bytes::Bytes;

    fn recorder() -> (Recorder, Arc<MemoryLog>) {
        let log = Arc::new(MemoryLog::new());
        let recorder = Recorder::with_log("testrecorder", Arc::clone(&log) as Arc<dyn RecorderLog>);
        (recorder, log)
    }

    fn request(method: &str, path: &str, body: &'static str) -> RecordedRequest {
        RecordedRequest::new(method, path, Vec::<(String, String)>::new(), body)
    }

    fn body_of(reply: Reply) -> Bytes {
        reply.into_full().body().clone()
    }

    #[test]
    fn test_no_expectations_yields_not_found() {
        let (recorder, log) = recorder();

        let reply = recorder.handle(request("GET", "/", "")).unwrap();

        assert_eq!(reply, Reply::NotFound);
        assert_eq!(reply.into_full().status(), StatusCode::NOT_FOUND);
        assert_eq!(recorder.unexpected_requests().len(), 1);

        let warnings = log.at(LogLevel::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("unexpected"));
        assert!(warnings[0].contains("GET to '/'"));
    }

    #[test]
    fn test_unexpected_requests_in_arrival_order() {
        let (recorder, log) = recorder();
        recorder.expect_path("/expected", "hit").unwrap();

        for path in ["/a", "/expected", "/b", "/c"] {
            recorder.handle(request("GET", path, "")).unwrap();
        }

        let paths: Vec<String> = recorder
            .unexpected_requests()
            .iter()
            .map(|request| request.path().to_string())
            .collect();
        assert_eq!(paths, ["/a", "/b", "/c"]);
        assert_eq!(log.at(LogLevel::Warn).len(), 3);
    }

    #[test]
    fn test_three_responses_in_order() {
        let (recorder, _log) = recorder();
        let expectation = recorder.expect_path("/path", ["a", "b", "c"]).unwrap();

        let replies: Vec<Bytes> = ["r1", "r2", "r3"]
            .into_iter()
            .map(|body| body_of(recorder.handle(request("POST", "/path", body)).unwrap()))
            .collect();

        assert_eq!(replies, vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
        assert!(recorder.unsatisfied_expectations().is_empty());
        assert_eq!(expectation.fulfilled_count(), 3);

        let fourth = recorder.handle(request("POST", "/path", "r4")).unwrap();
        assert_eq!(fourth, Reply::NotFound);
        assert_eq!(recorder.unexpected_requests()[0].body(), &Bytes::from("r4"));
    }

    #[tokio::test]
    async fn test_waits_observe_requests_in_order() {
        let (recorder, _log) = recorder();
        let expectation = recorder.expect_path("/path", ["a", "b", "c"]).unwrap();

        for body in ["r1", "r2", "r3"] {
            recorder.handle(request("POST", "/path", body)).unwrap();
        }

        assert_eq!(expectation.wait().await.unwrap(), Bytes::from("r1"));
        assert_eq!(expectation.wait().await.unwrap(), Bytes::from("r2"));
        assert_eq!(expectation.wait().await.unwrap(), Bytes::from("r3"));
    }

    #[test]
    fn test_body_matchers_do_not_overlap() {
        let (recorder, _log) = recorder();
        let foo = recorder
            .expect_with(
                |request: &RecordedRequest| request.body_contains("foo"),
                "foo called",
                ExpectOptions::default().name("foo-matcher"),
            )
            .unwrap();
        let bar = recorder
            .expect(|request: &RecordedRequest| request.body_contains("bar"), "bar called")
            .unwrap();

        let reply = recorder.handle(request("POST", "/rpc", "bar")).unwrap();

        assert_eq!(body_of(reply), Bytes::from("bar called"));
        assert_eq!(bar.fulfilled_count(), 1);
        assert_eq!(foo.fulfilled_count(), 0);
    }

    #[test]
    fn test_ambiguous_match_is_an_error() {
        let (recorder, _log) = recorder();
        let by_path = recorder.expect_path("/path", "").unwrap();
        let by_body = recorder
            .expect_with(
                |request: &RecordedRequest| request.body_contains("body"),
                "",
                ExpectOptions::default().name("body-matcher"),
            )
            .unwrap();

        let error = recorder.handle(request("POST", "/path", "body 1")).unwrap_err();

        match error {
            RecorderError::AmbiguousMatch { expectations, .. } => {
                assert_eq!(
                    expectations,
                    vec!["expectation '/path'".to_string(), "expectation 'body-matcher'".to_string()]
                );
            }
            other => panic!("expected AmbiguousMatch, got {other:?}"),
        }
        assert_eq!(by_path.fulfilled_count(), 0);
        assert_eq!(by_body.fulfilled_count(), 0);
        assert!(recorder.unexpected_requests().is_empty());
    }

    #[test]
    fn test_exhausted_expectation_no_longer_ambiguous() {
        let (recorder, _log) = recorder();
        recorder.expect_path("/path", "first").unwrap();
        recorder.handle(request("GET", "/path", "")).unwrap();
        recorder
            .expect(|_: &RecordedRequest| true, ResponseSource::repeat("fallback"))
            .unwrap();

        let reply = recorder.handle(request("GET", "/path", "")).unwrap();

        assert_eq!(body_of(reply), Bytes::from("fallback"));
    }

    #[test]
    fn test_unbounded_never_unsatisfied() {
        let (recorder, log) = recorder();
        recorder.expect_path("/", ResponseSource::repeat(&b"on and on..."[..])).unwrap();

        recorder.report_unsatisfied();
        for _ in 0..10 {
            let reply = recorder.handle(request("POST", "/", "")).unwrap();
            assert_eq!(body_of(reply), Bytes::from_static(b"on and on..."));
        }
        recorder.report_unsatisfied();

        assert!(recorder.unsatisfied_expectations().is_empty());
        assert!(log.at(LogLevel::Warn).is_empty());
    }

    #[test]
    fn test_report_unsatisfied_lists_all_names() {
        let (recorder, log) = recorder();
        recorder.expect_path("/never_gets_called", "unused").unwrap();
        recorder.expect_path("/neither", "unused").unwrap();
        let satisfied = recorder.expect_path("/called", "used").unwrap();
        recorder.handle(request("GET", "/called", "")).unwrap();

        let unsatisfied = recorder.unsatisfied_expectations();
        assert_eq!(unsatisfied.len(), 2);
        assert_eq!(unsatisfied[0].name(), Some("/never_gets_called"));
        assert!(!satisfied.is_still_expecting());

        recorder.report_unsatisfied();

        let warnings = log.at(LogLevel::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("/never_gets_called"));
        assert!(warnings[0].contains("/neither"));
        assert!(!warnings[0].contains("/called'"));
    }

    #[test]
    fn test_one_info_line_per_request() {
        let (recorder, log) = recorder();
        recorder.expect_path("/log_me", "response_with_logging").unwrap();

        recorder.handle(request("PUT", "/log_me", "")).unwrap();

        let lines = log.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, LogLevel::Info);
        assert!(lines[0].1.contains("PUT"));
        assert!(lines[0].1.contains("/log_me"));
    }

    #[test]
    fn test_log_names_rpc_method() {
        let (recorder, log) = recorder();

        recorder
            .handle(request(
                "POST",
                "/RPC2",
                "<methodCall><methodName>another_method</methodName></methodCall>",
            ))
            .unwrap();

        let warnings = log.at(LogLevel::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("XmlRpc - another_method"));
    }

    #[test]
    fn test_full_response_returned_unmodified() {
        let (recorder, _log) = recorder();
        let full = FullResponse::new(StatusCode::from_u16(214).unwrap())
            .with_content_type(hyper::header::HeaderValue::from_static("application/json"))
            .with_body("{}");
        recorder.expect_path("/", full.clone()).unwrap();

        let reply = recorder.handle(request("POST", "/", "")).unwrap();

        assert_eq!(reply.into_full(), full);
    }

    #[test]
    fn test_invalid_response_source_fails_registration() {
        let (recorder, _log) = recorder();

        let result = recorder.expect_path("/", ResponseSource::sequence(Vec::<&str>::new()));

        assert!(matches!(result, Err(RecorderError::InvalidResponseSource(_))));
        assert!(recorder.expectations().is_empty());
    }

    #[test]
    fn test_concurrent_requests_never_share_a_slot() {
        let (recorder, _log) = recorder();
        let recorder = Arc::new(recorder);
        let expectation = recorder
            .expect_path("/", ResponseSource::sequence((0..8).map(|i| format!("response {i}"))))
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let recorder = Arc::clone(&recorder);
                std::thread::spawn(move || recorder.handle(request("POST", "/", "")).unwrap())
            })
            .collect();

        let mut bodies: Vec<Bytes> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|reply| *reply != Reply::NotFound)
            .map(body_of)
            .collect();
        bodies.sort();
        bodies.dedup();

        assert_eq!(bodies.len(), 8);
        assert_eq!(expectation.fulfilled_count(), 8);
        assert_eq!(recorder.unexpected_requests().len(), 8);
    }
}
