//! http-request-recorder - programmable HTTP test double
//!
//! Runs a listening server that records every incoming request and answers it
//! from a set of registered expectations. Tests await the arrival of expected
//! requests and assert on unexpected ones afterwards.
//!
//! ```no_run
//! use std::sync::Arc;
//! use http_request_recorder::{Recorder, RecorderServer};
//!
//! # async fn example() -> http_request_recorder::Result<()> {
//! let recorder = Arc::new(Recorder::new("backend"));
//! let server = RecorderServer::start(Arc::clone(&recorder), ([127, 0, 0, 1], 0).into()).await?;
//!
//! let expectation = recorder.expect_path("/any-path", "Hello back from recorder")?;
//! // ... drive the system under test against `server.local_addr()` ...
//! let body = expectation.wait().await?;
//! assert_eq!(&body[..], b"Hello");
//!
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod expectation;
pub mod log;
pub mod matcher;
pub mod network;
pub mod recorder;
pub mod request;
pub mod response;
pub mod rpc;

pub use error::{RecorderError, Result};
pub use expectation::{ExpectOptions, Expectation, ResponseCycle, ResponseSource};
pub use log::{LogLevel, MemoryLog, RecorderLog, TracingLog};
pub use matcher::{Matcher, RequestPattern};
pub use network::RecorderServer;
pub use recorder::{Recorder, Reply};
pub use request::RecordedRequest;
pub use response::{CannedResponse, FullResponse};
