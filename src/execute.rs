use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::StatusCode;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::duration_ms;
use crate::config::RetryConfig;
use crate::error::Error;
use crate::metrics::RetryMetrics;
use crate::observe::{Observer, RequestMode};
use crate::replay::{AttemptCache, EventSink, replay};
use crate::requester::{BodyStream, Requester};
use crate::response::{HttpResponse, ResponseEvent, ResponseHead};
use crate::retry::{AttemptState, RetryDecision, within_budget};

/// One invocation of the retry state machine.
///
/// Attempts run strictly one after another; `attempts` only ever grows.
pub(crate) struct Execution<'a, O> {
    pub(crate) requester: &'a dyn Requester<O>,
    pub(crate) config: &'a RetryConfig,
    pub(crate) observer: Option<&'a dyn Observer>,
    pub(crate) metrics: &'a RetryMetrics,
    pub(crate) mode: RequestMode,
    pub(crate) options: &'a O,
    pub(crate) cancel: &'a CancellationToken,
    pub(crate) attempts: &'a AtomicUsize,
}

/// Finalizes as aborted when a buffered future is dropped before it settles.
struct DropAbort<'e, 'a, O> {
    execution: &'e Execution<'a, O>,
    armed: bool,
}

impl<O> Drop for DropAbort<'_, '_, O> {
    fn drop(&mut self) {
        if self.armed {
            let attempt = self.execution.attempts.load(Ordering::Acquire);
            self.execution.aborted(attempt);
        }
    }
}

impl<O> Execution<'_, O> {
    pub(crate) async fn run_buffered(&self) -> Result<HttpResponse, Error> {
        let mut guard = DropAbort {
            execution: self,
            armed: true,
        };
        let result = self.buffered_attempts().await;
        guard.armed = false;
        result
    }

    async fn buffered_attempts(&self) -> Result<HttpResponse, Error> {
        self.transition(0, AttemptState::Idle);
        let mut attempt = 0_usize;
        loop {
            attempt += 1;
            self.begin_attempt(attempt);

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.aborted(attempt)),
                outcome = self.requester.request(self.options) => outcome,
            };
            let response = match outcome {
                Ok(response) => response,
                Err(error) => {
                    let error = error.with_attempt(attempt);
                    warn!(attempt, error = %error, "attempt failed at transport level");
                    self.finalize(attempt, AttemptState::Failed);
                    return Err(error);
                }
            };

            let (head, body) = response.into_parts();
            let body = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.aborted(attempt)),
                body = read_body(body, attempt) => body,
            };
            let body = match body {
                Ok(body) => body,
                Err(error) => {
                    warn!(attempt, error = %error, "failed to read response body");
                    self.finalize(attempt, AttemptState::Failed);
                    return Err(error);
                }
            };

            if self.should_retry(attempt, &head) {
                drop(body);
                if !self.backoff(attempt, head.status()).await {
                    return Err(self.aborted(attempt));
                }
                continue;
            }

            self.finalize(attempt, AttemptState::Completed);
            return Ok(HttpResponse::new(head, body, attempt));
        }
    }

    pub(crate) async fn run_streaming(&self, sink: &EventSink) -> AttemptState {
        self.transition(0, AttemptState::Idle);
        let mut attempt = 0_usize;
        loop {
            attempt += 1;
            self.begin_attempt(attempt);
            let mut cache = AttemptCache::new(attempt);

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    cache.discard();
                    self.aborted(attempt);
                    return AttemptState::Aborted;
                }
                outcome = self.requester.request(self.options) => outcome,
            };
            let response = match outcome {
                Ok(response) => response,
                Err(error) => {
                    let error = error.with_attempt(attempt);
                    warn!(attempt, error = %error, "attempt failed at transport level");
                    cache.push(ResponseEvent::Error(error));
                    let state = replay(cache, None, sink).await;
                    return self.finalize(attempt, state);
                }
            };

            let (head, body) = response.into_parts();
            let status = head.status();
            let retry = self.should_retry(attempt, &head);
            cache.push(ResponseEvent::Response(head));

            if retry {
                cache.discard();
                drop(body);
                if !self.backoff(attempt, status).await {
                    self.aborted(attempt);
                    return AttemptState::Aborted;
                }
                continue;
            }

            self.transition(attempt, AttemptState::Replaying);
            let state = replay(cache, Some(body), sink).await;
            return self.finalize(attempt, state);
        }
    }

    fn begin_attempt(&self, attempt: usize) {
        self.attempts.store(attempt, Ordering::Release);
        self.metrics.record_attempt();
        if let Some(observer) = self.observer {
            observer.on_attempt_start(self.mode, attempt);
        }
        self.transition(attempt, AttemptState::Attempting);
    }

    fn transition(&self, attempt: usize, state: AttemptState) {
        debug!(attempt, state = %state, "request state changed");
    }

    /// Exhaustion wins over the classifier, which is not consulted once the
    /// budget is spent.
    fn should_retry(&self, attempt: usize, head: &ResponseHead) -> bool {
        within_budget(attempt, self.config.retries()) && self.config.classifier().should_retry(head)
    }

    /// Waits out the backoff before the next attempt. Returns `false` when the
    /// request was aborted first; the timer is dropped and never fires.
    async fn backoff(&self, attempt: usize, status: StatusCode) -> bool {
        self.transition(attempt, AttemptState::Backoff);
        let delay = self.config.backoff().delay_for_attempt(attempt);
        let decision = RetryDecision {
            attempt,
            retries: self.config.retries(),
            status,
        };
        warn!(
            attempt,
            status = status.as_u16(),
            delay_ms = duration_ms(delay),
            "retrying request after retryable response"
        );
        self.metrics.record_retry();
        if let Some(observer) = self.observer {
            observer.on_retry_scheduled(self.mode, &decision, delay);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    fn aborted(&self, attempt: usize) -> Error {
        debug!(attempt, "request aborted");
        self.finalize(attempt, AttemptState::Aborted);
        Error::Aborted
    }

    fn finalize(&self, attempt: usize, state: AttemptState) -> AttemptState {
        self.transition(attempt, state);
        self.metrics.record_finalized(state);
        if let Some(observer) = self.observer {
            observer.on_finalized(self.mode, attempt, state);
        }
        state
    }
}

async fn read_body(mut body: BodyStream, attempt: usize) -> Result<Bytes, Error> {
    let mut collected = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|source| Error::ReadBody { attempt, source })?;
        collected.extend_from_slice(&chunk);
    }
    Ok(collected.freeze())
}
