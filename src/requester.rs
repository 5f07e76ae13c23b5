use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::stream;
use http::{HeaderMap, StatusCode};

use crate::error::{BoxError, Error};
use crate::response::ResponseHead;

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;
pub type AttemptFuture = Pin<Box<dyn Future<Output = Result<AttemptResponse, Error>> + Send>>;

/// What a single attempt produced: the response head and a body still to be read.
pub struct AttemptResponse {
    head: ResponseHead,
    body: BodyStream,
}

impl AttemptResponse {
    pub fn new<S>(status: StatusCode, headers: HeaderMap, body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        Self {
            head: ResponseHead::new(status, headers),
            body: Box::pin(body),
        }
    }

    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self::from_chunks(status, headers, [body.into()])
    }

    pub fn from_chunks<I>(status: StatusCode, headers: HeaderMap, chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self::new(status, headers, stream::iter(chunks.into_iter().map(Ok)))
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn into_parts(self) -> (ResponseHead, BodyStream) {
        (self.head, self.body)
    }
}

impl std::fmt::Debug for AttemptResponse {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AttemptResponse")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// Performs exactly one attempt of a request.
///
/// The orchestrator stops an attempt by dropping its future or its body
/// stream; implementations release their connection on drop. A requester that
/// needs a per-attempt timeout has to enforce it itself.
pub trait Requester<O>: Send + Sync {
    fn request(&self, options: &O) -> AttemptFuture;
}

impl<O, F, Fut> Requester<O> for F
where
    F: Fn(&O) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AttemptResponse, Error>> + Send + 'static,
{
    fn request(&self, options: &O) -> AttemptFuture {
        Box::pin(self(options))
    }
}
