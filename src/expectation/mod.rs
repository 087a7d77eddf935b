//! Expectations: a matcher paired with a cycle of canned responses

mod cycle;

pub use cycle::{ResponseCycle, ResponseSlot, ResponseSource};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::matcher::Matcher;
use crate::request::RecordedRequest;
use crate::response::CannedResponse;
use crate::{RecorderError, Result};

/// Default time `wait()` gives a request to arrive
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Optional settings for a registered expectation
#[derive(Debug, Clone, Default)]
pub struct ExpectOptions {
    /// Display name; defaults to the matcher's description
    pub name: Option<String>,
    /// `wait()` timeout; defaults to the recorder's
    pub timeout: Option<Duration>,
}

impl ExpectOptions {
    /// Set the display name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the `wait()` timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A registered rule: requests accepted by the matcher are answered from the
/// response cycle, and tests wait on the requests that arrived
pub struct Expectation {
    id: usize,
    name: Option<String>,
    matcher: Box<dyn Matcher>,
    cycle: ResponseCycle,
    timeout: Duration,
}

impl Expectation {
    /// Create an expectation
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponseSource` if `responses` cannot form a cycle
    pub fn new(
        id: usize,
        matcher: Box<dyn Matcher>,
        responses: ResponseSource,
        name: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let cycle = ResponseCycle::new(responses)?;
        let name = name.or_else(|| matcher.describe());

        Ok(Self {
            id,
            name,
            matcher,
            cycle,
            timeout,
        })
    }

    /// Display name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of responses; `None` responds forever
    pub fn expected_count(&self) -> Option<usize> {
        self.cycle.expected_count()
    }

    /// Number of requests answered so far
    pub fn fulfilled_count(&self) -> usize {
        self.cycle.produced()
    }

    /// Timeout used by [`Expectation::wait`]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether this expectation would answer `request`
    pub fn can_respond(&self, request: &RecordedRequest) -> bool {
        self.matcher.matches(request) && self.cycle.has_next()
    }

    /// Whether a finite expectation has responses left
    ///
    /// Expectations that respond forever are never still expecting.
    pub fn is_still_expecting(&self) -> bool {
        self.expected_count()
            .is_some_and(|count| self.fulfilled_count() < count)
    }

    /// Answer one request: fulfil the next slot with `body`
    ///
    /// Returns `None` if the responses ran out, which happens when concurrent
    /// requests raced for the last one.
    pub fn record_once(&self, body: Bytes) -> Option<CannedResponse> {
        self.cycle.produce(body)
    }

    /// Wait for the request answering the next response slot
    ///
    /// The slot is taken when `wait` is called, not when the future is first
    /// polled, so successive calls observe successive requests.
    ///
    /// # Errors
    ///
    /// Returns `WaitTimeout` if no request arrived in time and
    /// `ResponsesExhausted` if every response already has a waiter
    pub fn wait(&self) -> impl Future<Output = Result<Bytes>> + Send + 'static {
        self.wait_within(self.timeout)
    }

    /// Like [`Expectation::wait`] with a one-off timeout
    ///
    /// # Errors
    ///
    /// See [`Expectation::wait`]
    pub fn wait_within(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Bytes>> + Send + 'static {
        let slot = self.cycle.consume();
        let expectation = self.to_string();

        async move {
            let slot: Arc<ResponseSlot> =
                slot.ok_or_else(|| RecorderError::ResponsesExhausted {
                    expectation: expectation.clone(),
                })?;

            match tokio::time::timeout(timeout, slot.fulfilled()).await {
                Ok(signal) => signal?,
                Err(_) => {
                    return Err(RecorderError::WaitTimeout {
                        expectation,
                        timeout,
                    })
                }
            }

            slot.captured().ok_or_else(|| {
                RecorderError::InvariantViolation(format!(
                    "{expectation} was fulfilled without a request body"
                ))
            })
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "expectation '{name}'"),
            None => write!(f, "expectation #{}", self.id),
        }
    }
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expectation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cycle", &self.cycle)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
