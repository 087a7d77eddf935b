//! Response cycle with independent produce and consume cursors

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::watch;

use crate::response::CannedResponse;
use crate::{RecorderError, Result};

/// Where an expectation's responses come from
pub enum ResponseSource {
    /// A finite, ordered list of responses; a single value is a list of one
    Finite(Vec<CannedResponse>),
    /// A lazily pulled, possibly endless sequence of responses
    Unbounded(Box<dyn Iterator<Item = CannedResponse> + Send>),
}

impl ResponseSource {
    /// One response, served once
    pub fn single(response: impl Into<CannedResponse>) -> Self {
        Self::Finite(vec![response.into()])
    }

    /// Serve `responses` in order, once each
    pub fn sequence<I>(responses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<CannedResponse>,
    {
        Self::Finite(responses.into_iter().map(Into::into).collect())
    }

    /// Pull responses from `responses` as requests arrive
    pub fn unbounded<I>(responses: I) -> Self
    where
        I: IntoIterator + 'static,
        I::IntoIter: Send,
        I::Item: Into<CannedResponse>,
    {
        Self::Unbounded(Box::new(responses.into_iter().map(Into::into)))
    }

    /// Serve the same response forever
    pub fn repeat(response: impl Into<CannedResponse>) -> Self {
        Self::Unbounded(Box::new(std::iter::repeat(response.into())))
    }
}

impl fmt::Debug for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(responses) => f.debug_tuple("Finite").field(responses).finish(),
            Self::Unbounded(_) => f.write_str("Unbounded(..)"),
        }
    }
}

macro_rules! single_response_source {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ResponseSource {
                fn from(response: $ty) -> Self {
                    Self::single(response)
                }
            }
        )*
    };
}

single_response_source!(
    &str,
    String,
    &[u8],
    Vec<u8>,
    Bytes,
    CannedResponse,
    crate::response::FullResponse,
);

impl<const N: usize> From<&[u8; N]> for ResponseSource {
    fn from(response: &[u8; N]) -> Self {
        Self::single(response)
    }
}

impl<T: Into<CannedResponse>, const N: usize> From<[T; N]> for ResponseSource {
    fn from(responses: [T; N]) -> Self {
        Self::sequence(responses)
    }
}

/// One response of the sequence and the request that triggered it
pub struct ResponseSlot {
    response: CannedResponse,
    request: Mutex<Option<Bytes>>,
    fulfilled: watch::Sender<bool>,
}

impl ResponseSlot {
    fn new(response: CannedResponse) -> Self {
        let (fulfilled, _) = watch::channel(false);
        Self {
            response,
            request: Mutex::new(None),
            fulfilled,
        }
    }

    /// Whether a request has been answered with this slot
    pub fn is_fulfilled(&self) -> bool {
        *self.fulfilled.borrow()
    }

    /// Body of the request that fulfilled this slot
    pub fn captured(&self) -> Option<Bytes> {
        self.request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fulfil(&self, body: Bytes) -> CannedResponse {
        *self.request.lock().unwrap_or_else(PoisonError::into_inner) = Some(body);
        self.fulfilled.send_replace(true);
        self.response.clone()
    }

    /// Resolve once the slot is fulfilled
    pub(crate) async fn fulfilled(&self) -> Result<()> {
        let mut rx = self.fulfilled.subscribe();
        rx.wait_for(|fulfilled| *fulfilled)
            .await
            .map(|_| ())
            .map_err(|_| RecorderError::InvariantViolation("slot signal closed".to_string()))
    }
}

struct Cursors {
    slots: Vec<Arc<ResponseSlot>>,
    pending: Option<Box<dyn Iterator<Item = CannedResponse> + Send>>,
    produced: usize,
    consumed: usize,
}

impl Cursors {
    /// Slot at `index`, pulling from an unbounded source as needed
    fn slot(&mut self, index: usize) -> Option<Arc<ResponseSlot>> {
        while self.slots.len() <= index {
            let response = self.pending.as_mut()?.next()?;
            self.slots.push(Arc::new(ResponseSlot::new(response)));
        }
        Some(Arc::clone(&self.slots[index]))
    }
}

/// An ordered, possibly endless sequence of response slots
///
/// Matched requests advance the produce cursor and waiting tests advance the
/// consume cursor. Both walk the same slots in the same order, so the Nth
/// consumed slot is the one fulfilled by the Nth matched request.
pub struct ResponseCycle {
    cursors: Mutex<Cursors>,
    expected_count: Option<usize>,
}

impl ResponseCycle {
    /// Build a cycle from a response source
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponseSource` for an empty finite source
    pub fn new(source: ResponseSource) -> Result<Self> {
        let (slots, pending, expected_count) = match source {
            ResponseSource::Finite(responses) => {
                if responses.is_empty() {
                    return Err(RecorderError::InvalidResponseSource(
                        "a finite response sequence needs at least one response".to_string(),
                    ));
                }
                let count = responses.len();
                let slots = responses
                    .into_iter()
                    .map(|response| Arc::new(ResponseSlot::new(response)))
                    .collect();
                (slots, None, Some(count))
            }
            ResponseSource::Unbounded(responses) => (Vec::new(), Some(responses), None),
        };

        Ok(Self {
            cursors: Mutex::new(Cursors {
                slots,
                pending,
                produced: 0,
                consumed: 0,
            }),
            expected_count,
        })
    }

    /// Number of responses, `None` for an unbounded source
    pub fn expected_count(&self) -> Option<usize> {
        self.expected_count
    }

    /// Number of slots handed out to matched requests
    pub fn produced(&self) -> usize {
        self.lock().produced
    }

    /// Whether another matched request can still be answered
    pub fn has_next(&self) -> bool {
        let mut cursors = self.lock();
        let index = cursors.produced;
        cursors.slot(index).is_some()
    }

    /// Fulfil the next slot with `body` and return its response
    ///
    /// Returns `None` once the sequence is exhausted.
    pub fn produce(&self, body: Bytes) -> Option<CannedResponse> {
        let slot = {
            let mut cursors = self.lock();
            let index = cursors.produced;
            let slot = cursors.slot(index)?;
            cursors.produced += 1;
            slot
        };
        Some(slot.fulfil(body))
    }

    /// Take the next slot for a waiter
    ///
    /// Returns `None` once the sequence is exhausted.
    pub fn consume(&self) -> Option<Arc<ResponseSlot>> {
        let mut cursors = self.lock();
        let index = cursors.consumed;
        let slot = cursors.slot(index)?;
        cursors.consumed += 1;
        Some(slot)
    }

    fn lock(&self) -> MutexGuard<'_, Cursors> {
        self.cursors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ResponseCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cursors = self.lock();
        f.debug_struct("ResponseCycle")
            .field("expected_count", &self.expected_count)
            .field("produced", &cursors.produced)
            .field("consumed", &cursors.consumed)
            .finish()
    }
}
