use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::error::Error;
use crate::util::truncate_body;

#[derive(Clone, Debug)]
pub struct ResponseHead {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    head: ResponseHead,
    body: Bytes,
    attempts: usize,
}

impl HttpResponse {
    pub(crate) fn new(head: ResponseHead, body: Bytes, attempts: usize) -> Self {
        Self {
            head,
            body,
            attempts,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.head.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Number of attempts made, including the one that produced this response.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(&self.body),
        })
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

/// One event of the terminal attempt, in the order the attempt produced it.
///
/// A well-formed stream is `Response`, any number of `Data`, then `Complete`;
/// or a single `Error` when the transport failed.
#[derive(Debug)]
pub enum ResponseEvent {
    Response(ResponseHead),
    Data(Bytes),
    Complete,
    Error(Error),
}

impl ResponseEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error(_))
    }
}

/// Cancels the in-flight work behind a [`ResponseStream`] or a callback request.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    cancel: CancellationToken,
}

impl AbortHandle {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Output of a streaming request.
///
/// Available immediately; yields the events of the terminal attempt only.
/// After [`abort`](Self::abort) the stream ends without a terminal event.
/// Dropping the stream aborts the request as well.
#[derive(Debug)]
pub struct ResponseStream {
    events: mpsc::Receiver<ResponseEvent>,
    cancel: CancellationToken,
    attempts: Arc<AtomicUsize>,
    finished: bool,
}

impl ResponseStream {
    pub(crate) fn new(
        events: mpsc::Receiver<ResponseEvent>,
        cancel: CancellationToken,
        attempts: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            events,
            cancel,
            attempts,
            finished: false,
        }
    }

    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(self.cancel.clone())
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Attempts started so far for this request.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }

    /// Drains the stream into a buffered response.
    pub async fn collect_response(mut self) -> Result<HttpResponse> {
        let mut head = None;
        let mut body = BytesMut::new();
        while let Some(event) = self.next().await {
            match event {
                ResponseEvent::Response(response_head) => head = Some(response_head),
                ResponseEvent::Data(chunk) => body.extend_from_slice(&chunk),
                ResponseEvent::Complete => {
                    let Some(head) = head else {
                        break;
                    };
                    return Ok(HttpResponse::new(head, body.freeze(), self.attempts()));
                }
                ResponseEvent::Error(error) => return Err(error),
            }
        }
        Err(Error::Aborted)
    }
}

impl Stream for ResponseStream {
    type Item = ResponseEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished || this.cancel.is_cancelled() {
            this.finished = true;
            return Poll::Ready(None);
        }
        match this.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
