//! Conversion between hyper messages and recorder values

use std::borrow::Cow;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, CONTENT_LENGTH};
use hyper::{Method, Response, StatusCode, Uri};

use crate::request::RecordedRequest;
use crate::response::FullResponse;
use crate::{RecorderError, Result};

/// Methods forwarded to the recorder; everything else gets 405
pub const SUPPORTED_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Whether requests with `method` are forwarded to the recorder
#[must_use]
pub fn is_supported_method(method: &Method) -> bool {
    SUPPORTED_METHODS.contains(method)
}

/// Build a recorded request from the request head and its full body
///
/// The path is percent-decoded; a path that does not decode to UTF-8 is kept
/// as sent.
#[must_use]
pub fn recorded_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> RecordedRequest {
    let raw_path = uri.path();
    let path = urlencoding::decode(raw_path).unwrap_or(Cow::Borrowed(raw_path));

    let headers = headers.iter().map(|(name, value)| {
        (
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
    });

    RecordedRequest::new(method.as_str(), path.into_owned(), headers, body)
}

/// Read a request body with a size limit
///
/// The transport stream is single-pass, so this is the only read of the body.
/// Reading stops as soon as the limit is crossed, so a chunked body without
/// `Content-Length` is never buffered past `max_size`.
///
/// # Errors
///
/// Returns error if body is too large or read fails
pub async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let collected = Limited::new(body, max_size).collect().await.map_err(|e| {
        if e.downcast_ref::<LengthLimitError>().is_some() {
            RecorderError::DataTooLarge {
                size: max_size.saturating_add(1),
                limit: max_size,
            }
        } else {
            RecorderError::BodyRead(e.to_string())
        }
    })?;

    Ok(collected.to_bytes())
}

/// Reject a request whose announced length exceeds the limit
///
/// # Errors
///
/// Returns `DataTooLarge` if `Content-Length` is above `max_size`
pub fn check_content_length(headers: &HeaderMap, max_size: usize) -> Result<()> {
    let announced = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    match announced {
        Some(size) if size > max_size => Err(RecorderError::DataTooLarge {
            size,
            limit: max_size,
        }),
        _ => Ok(()),
    }
}

/// Turn a recorder response into a hyper response
#[must_use]
pub fn into_hyper(response: FullResponse) -> Response<Full<Bytes>> {
    let (status, headers, body) = response.into_parts();

    let mut hyper_response = Response::new(Full::new(body));
    *hyper_response.status_mut() = status;
    *hyper_response.headers_mut() = headers;
    hyper_response
}

/// Create a plain-text response
#[must_use]
pub fn create_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
}

/// Create an error response
#[must_use]
pub fn error_response(error: &RecorderError) -> Response<Full<Bytes>> {
    let status = match error {
        RecorderError::DataTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        RecorderError::BodyRead(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    create_response(status, &format!("Error: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::StreamBody;
    use hyper::body::Frame;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::Request;

    fn head(method: &str, uri: &str, headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_recorded_request_decodes_path() {
        let head = head(
            "POST",
            "/some%20path/x?query=1",
            &[("Foo", "23"), ("Content-Type", "text/plain")],
        );

        let request = recorded_request(
            head.method(),
            head.uri(),
            head.headers(),
            Bytes::from_static(b"data"),
        );

        assert_eq!(request.method(), "POST");
        assert_eq!(request.path(), "/some path/x");
        assert_eq!(request.header("foo"), Some("23"));
        assert_eq!(request.headers()[1].0, "content-type");
        assert_eq!(request.body(), &Bytes::from_static(b"data"));
    }

    #[test]
    fn test_supported_methods() {
        assert!(is_supported_method(&Method::OPTIONS));
        assert!(is_supported_method(&Method::DELETE));
        assert!(!is_supported_method(&Method::PATCH));
        assert!(!is_supported_method(&Method::TRACE));
    }

    #[test]
    fn test_check_content_length() {
        let small = head("POST", "/", &[("Content-Length", "10")]);
        let large = head("POST", "/", &[("Content-Length", "10000")]);
        let none = head("GET", "/", &[]);

        assert!(check_content_length(small.headers(), 1024).is_ok());
        assert!(check_content_length(large.headers(), 1024).is_err());
        assert!(check_content_length(none.headers(), 1024).is_ok());
    }

    #[tokio::test]
    async fn test_read_body() {
        let data = Bytes::from("test data");
        let body = Full::new(data.clone());

        let result = read_body(body, 1024).await;
        assert_eq!(result.unwrap(), data);
    }

    #[tokio::test]
    async fn test_read_body_too_large() {
        let body = Full::new(Bytes::from("test data that is too long"));

        let result = read_body(body, 5).await;
        assert!(matches!(result, Err(RecorderError::DataTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_read_body_stops_at_limit_without_content_length() {
        // The trailing error is never reached once the limit trips.
        let frames: Vec<std::result::Result<Frame<Bytes>, std::io::Error>> = vec![
            Ok(Frame::data(Bytes::from("0123456789"))),
            Ok(Frame::data(Bytes::from("0123456789"))),
            Err(std::io::Error::other("read past the limit")),
        ];
        let body = StreamBody::new(futures_util::stream::iter(frames));

        let result = read_body(body, 15).await;
        assert!(matches!(
            result,
            Err(RecorderError::DataTooLarge { limit: 15, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_body_stream_error() {
        let frames: Vec<std::result::Result<Frame<Bytes>, std::io::Error>> = vec![
            Ok(Frame::data(Bytes::from("part"))),
            Err(std::io::Error::other("connection reset")),
        ];
        let body = StreamBody::new(futures_util::stream::iter(frames));

        let result = read_body(body, 1024).await;
        match result {
            Err(RecorderError::BodyRead(message)) => assert!(message.contains("connection reset")),
            other => panic!("expected BodyRead, got {other:?}"),
        }
    }

    #[test]
    fn test_into_hyper_keeps_everything() {
        let full = FullResponse::new(StatusCode::from_u16(214).unwrap())
            .with_content_type(HeaderValue::from_static("application/json"))
            .with_body("{}");

        let response = into_hyper(full);

        assert_eq!(response.status().as_u16(), 214);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_error_response() {
        let ambiguous = RecorderError::AmbiguousMatch {
            recorder: "recorder 'r'".to_string(),
            expectations: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            error_response(&ambiguous).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let too_large = RecorderError::DataTooLarge { size: 10, limit: 1 };
        assert_eq!(
            error_response(&too_large).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
