use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Error;
use crate::requester::BodyStream;
use crate::response::ResponseEvent;
use crate::retry::AttemptState;

/// Sending half of the externally visible output.
///
/// Every send races the abort signal, so nothing is forwarded once the
/// request has been aborted.
pub(crate) struct EventSink {
    events: mpsc::Sender<ResponseEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    pub(crate) fn new(events: mpsc::Sender<ResponseEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    async fn send(&self, event: ResponseEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }
}

/// Events of a single attempt, held back until the attempt is known to be terminal.
#[derive(Debug)]
pub(crate) struct AttemptCache {
    attempt: usize,
    events: Vec<ResponseEvent>,
}

impl AttemptCache {
    pub(crate) fn new(attempt: usize) -> Self {
        Self {
            attempt,
            events: Vec::new(),
        }
    }

    pub(crate) fn attempt(&self) -> usize {
        self.attempt
    }

    pub(crate) fn push(&mut self, event: ResponseEvent) {
        self.events.push(event);
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// Releases a retried attempt's events without forwarding any of them.
    pub(crate) fn discard(self) {
        debug!(
            attempt = self.attempt,
            events = self.len(),
            "discarding attempt cache"
        );
    }
}

/// Forwards a terminal attempt to the output: cached events first, in order,
/// then the live remainder of its body.
///
/// Returns the state the request ends in. An abort stops forwarding at once;
/// whatever was already sent stays sent.
pub(crate) async fn replay(
    cache: AttemptCache,
    body: Option<BodyStream>,
    sink: &EventSink,
) -> AttemptState {
    let attempt = cache.attempt();
    for event in cache.events {
        let terminal = match &event {
            ResponseEvent::Complete => Some(AttemptState::Completed),
            ResponseEvent::Error(_) => Some(AttemptState::Failed),
            ResponseEvent::Response(_) | ResponseEvent::Data(_) => None,
        };
        if !sink.send(event).await {
            return AttemptState::Aborted;
        }
        if let Some(state) = terminal {
            return state;
        }
    }

    let Some(mut body) = body else {
        return finish(sink, ResponseEvent::Complete, AttemptState::Completed).await;
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = sink.cancel.cancelled() => return AttemptState::Aborted,
            next = body.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                if chunk.is_empty() {
                    continue;
                }
                if !sink.send(ResponseEvent::Data(chunk)).await {
                    return AttemptState::Aborted;
                }
            }
            Some(Err(source)) => {
                let error = Error::ReadBody { attempt, source };
                return finish(sink, ResponseEvent::Error(error), AttemptState::Failed).await;
            }
            None => return finish(sink, ResponseEvent::Complete, AttemptState::Completed).await,
        }
    }
}

async fn finish(sink: &EventSink, event: ResponseEvent, state: AttemptState) -> AttemptState {
    if sink.send(event).await {
        state
    } else {
        AttemptState::Aborted
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::stream;
    use http::{HeaderMap, StatusCode};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::{AttemptCache, EventSink, replay};
    use crate::error::{BoxError, Error, TransportErrorKind};
    use crate::requester::BodyStream;
    use crate::response::{ResponseEvent, ResponseHead};
    use crate::retry::AttemptState;

    fn body(chunks: &[&'static str]) -> BodyStream {
        let items: Vec<Result<Bytes, BoxError>> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
            .collect();
        Box::pin(stream::iter(items))
    }

    fn head() -> ResponseHead {
        ResponseHead::new(StatusCode::OK, HeaderMap::new())
    }

    #[tokio::test]
    async fn replay_forwards_cached_events_then_live_body_in_order() {
        let (tx, mut rx) = mpsc::channel(16);
        let sink = EventSink::new(tx, CancellationToken::new());
        let mut cache = AttemptCache::new(1);
        cache.push(ResponseEvent::Response(head()));

        let state = replay(cache, Some(body(&["a", "", "b"])), &sink).await;
        assert_eq!(state, AttemptState::Completed);
        drop(sink);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(match event {
                ResponseEvent::Response(head) => format!("response:{}", head.status().as_u16()),
                ResponseEvent::Data(chunk) => format!("data:{}", String::from_utf8_lossy(&chunk)),
                ResponseEvent::Complete => "complete".to_owned(),
                ResponseEvent::Error(error) => format!("error:{error}"),
            });
        }
        assert_eq!(seen, ["response:200", "data:a", "data:b", "complete"]);
    }

    #[tokio::test]
    async fn cached_transport_error_ends_replay_as_failed() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(tx, CancellationToken::new());
        let mut cache = AttemptCache::new(1);
        cache.push(ResponseEvent::Error(
            Error::transport(TransportErrorKind::Dns, "no such host").with_attempt(1),
        ));

        let state = replay(cache, None, &sink).await;
        assert_eq!(state, AttemptState::Failed);
        match rx.recv().await {
            Some(ResponseEvent::Error(Error::Transport { kind, attempt, .. })) => {
                assert_eq!(kind, TransportErrorKind::Dns);
                assert_eq!(attempt, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_error_mid_replay_is_delivered_as_read_body() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = EventSink::new(tx, CancellationToken::new());
        let items: Vec<Result<Bytes, BoxError>> = vec![
            Ok(Bytes::from_static(b"part")),
            Err("connection reset".into()),
        ];
        let mut cache = AttemptCache::new(2);
        cache.push(ResponseEvent::Response(head()));

        let state = replay(cache, Some(Box::pin(stream::iter(items))), &sink).await;
        assert_eq!(state, AttemptState::Failed);

        assert!(matches!(rx.recv().await, Some(ResponseEvent::Response(_))));
        assert!(matches!(rx.recv().await, Some(ResponseEvent::Data(_))));
        match rx.recv().await {
            Some(ResponseEvent::Error(error)) => assert_eq!(error.attempt(), Some(2)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn abort_mid_replay_keeps_prefix_and_stops_forwarding() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let sink = EventSink::new(tx, cancel.clone());
        let mut cache = AttemptCache::new(1);
        cache.push(ResponseEvent::Response(head()));

        let pending_body: BodyStream = Box::pin(stream::pending::<Result<Bytes, BoxError>>());
        let task = tokio::spawn(async move { replay(cache, Some(pending_body), &sink).await });

        assert!(matches!(rx.recv().await, Some(ResponseEvent::Response(_))));
        cancel.cancel();

        let state = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("replay should stop promptly")
            .expect("replay task should not panic");
        assert_eq!(state, AttemptState::Aborted);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn discard_consumes_the_cache() {
        let mut cache = AttemptCache::new(3);
        cache.push(ResponseEvent::Response(head()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.attempt(), 3);
        cache.discard();
    }
}
